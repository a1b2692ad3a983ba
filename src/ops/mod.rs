pub mod composite;
pub mod effects;
pub mod mask;
