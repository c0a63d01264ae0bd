pub mod abif;
pub mod command;
pub mod fastx;
pub mod file;
pub mod platform;
pub mod plotting;
pub mod reads;
pub mod sambam;
pub mod sff;
pub mod stats;
pub mod system;
