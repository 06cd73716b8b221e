mod allocation;
mod common;
mod ledger;
