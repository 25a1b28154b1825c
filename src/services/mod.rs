// Services module - Business logic over the backend ledger

pub mod approval;
pub mod dashboard;
pub mod directory;
pub mod gateway;
pub mod ledger;
pub mod reports;
pub mod token_vault;
pub mod workflow;
