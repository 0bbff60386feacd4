//! Authorization core: principals, resources, policy, repository and mediator

pub mod audit;
pub mod iam;
pub mod mediator;
pub mod posts;
pub mod principal;
pub mod repository;
pub mod resource;
