pub mod controller;
pub mod crud;
pub mod model;
pub mod routes;
pub mod schema;
pub mod service;
