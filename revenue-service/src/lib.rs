//! Revenue Service - bus trip revenue, receivables, installments and shortage loans.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
