pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod query;
pub mod repo;
pub mod simulation;
pub mod telemetry;
