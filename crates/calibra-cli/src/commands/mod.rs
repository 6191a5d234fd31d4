pub mod analyze;
pub mod compare;
pub mod equate;
pub mod init;
pub mod validate;
