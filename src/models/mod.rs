//! Data models for Librairie

pub mod admin_code;
pub mod author;
pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use admin_code::AdminVerificationCode;
pub use author::Author;
pub use book::{Book, BookDetails};
pub use loan::{Loan, LoanDetails};
pub use user::{Role, User, UserClaims, UserSummary};
