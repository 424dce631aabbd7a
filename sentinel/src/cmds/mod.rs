pub mod init_config;
pub mod poll;
pub mod run;
