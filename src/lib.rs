pub mod accessory;
pub mod can;
pub mod config;
pub mod failsafe;
pub mod messages;
pub mod motion;
pub mod motor;
pub mod power;
pub mod runtime;
pub mod uplink;
