//! Help message display for CLI.

#![allow(clippy::print_stdout)]

use crate::constants::APP_NAME;

/// Print help message based on whether a configuration file exists.
pub fn print_smart_help(config_exists: bool) {
    if config_exists {
        print_configured_help();
    } else {
        print_first_time_help();
    }
}

/// Print detailed setup guide for first-time users.
pub fn print_first_time_help() {
    println!("No configuration found. Get started with {APP_NAME}:");
    println!();
    println!("1. Initialize configuration:");
    println!("   {APP_NAME} config init");
    println!();
    println!("2. Download the model weights (GFPGAN, RestoreFormer, Real-ESRGAN, face detector):");
    println!("   {APP_NAME} models fetch");
    println!();
    println!("3. Enhance a photo locally:");
    println!("   {APP_NAME} enhance portrait.jpg");
    println!();
    println!("4. Or run the HTTP service:");
    println!("   {APP_NAME} serve --port 5000");
    println!();
    println!("Run '{APP_NAME} -h' for all options.");
}

/// Print brief usage reminder for configured users.
pub fn print_configured_help() {
    println!("Usage: {APP_NAME} <COMMAND> [OPTIONS]");
    println!();
    println!("Example: {APP_NAME} enhance portrait.jpg -m 1.4 -u 2 -b realesrgan");
    println!();
    println!("Run '{APP_NAME} -h' for all options or '{APP_NAME} models list' to see cached weights.");
}
