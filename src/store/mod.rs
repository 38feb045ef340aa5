pub mod directory;
pub mod ephemeral;
pub mod log;
pub mod orders;
