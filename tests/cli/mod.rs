mod arguments;
mod config_file;
