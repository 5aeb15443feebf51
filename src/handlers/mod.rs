pub mod inbound;
pub mod system;
