pub mod app;
pub mod cli;
pub mod command;
pub mod config;
pub mod display;
pub mod fifo;
pub mod player;
pub mod remote;
pub mod streamer;
