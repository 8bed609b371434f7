pub mod crypto;
pub mod encoding;
pub mod registry;
pub mod skylink;
