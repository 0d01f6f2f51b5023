pub mod aggregation;
pub mod cache;
pub mod images;
pub mod mailer;
pub mod reports;
