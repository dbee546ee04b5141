pub mod deploy;
pub mod destroy;
pub mod info;
pub mod plan;
pub mod provision;
