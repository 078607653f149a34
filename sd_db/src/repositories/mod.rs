//! ABOUTME: One repository per table plus the report queries
//! ABOUTME: Each repository handles CRUD or aggregation queries for one concern

pub mod branches;
pub mod expenses;
pub mod reports;
pub mod seats;
pub mod shifts;
pub mod students;
pub mod transactions;
pub mod users;
