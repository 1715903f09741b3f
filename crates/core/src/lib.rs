pub mod enums;
pub mod ids;
pub mod job;
pub mod wire;
