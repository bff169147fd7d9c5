pub mod audit;
pub mod events;
