//! Program members and their agreements.
//!
//! Clients, brands, brand bonus rules and contracts. The registry itself
//! (onboarding, CRUD) lives outside this workspace; this crate holds the rules
//! the accrual and evaluation engines apply to those records.

pub mod brand;
pub mod client;
pub mod contract;

pub use brand::{Brand, BrandCatalog, BrandId};
pub use client::{Client, ClientId};
pub use contract::{BrandBonus, BrandBonusId, Contract, ContractId, select_active_contract};
