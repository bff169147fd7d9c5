pub mod audit;
pub mod events;
pub mod health;
