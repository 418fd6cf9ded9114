pub mod config;
pub mod datagen;
pub mod run;
