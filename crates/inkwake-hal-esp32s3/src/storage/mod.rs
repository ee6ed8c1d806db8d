pub mod flash_store;
pub mod retention;
