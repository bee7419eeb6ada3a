pub mod clients;
pub mod config;
pub mod contracts;
pub mod db;
pub mod events;
pub mod handlers;
pub mod health;
pub mod models;
pub mod processors;
pub mod repos;
pub mod routes;
pub mod service;
pub mod services;

pub use service::{Collaborators, Service};
