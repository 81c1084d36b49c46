//! Conduit - a social blogging backend
//!
//! Users register, follow each other, publish tagged articles, favorite
//! and comment on them. Everything is served as named RPC procedures
//! under `/api`.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
