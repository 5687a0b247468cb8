//! # AGV Fleet CLI
//!
//! Offline helpers for topics and message schemas.

use agv_fleet_proto::messages::decode;
use agv_fleet_proto::schema::schema_document;
use agv_fleet_proto::{Category, FleetIdentity, JsonSchemaRegistry, MessageValidator};
use anyhow::{anyhow, Context, Result};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "topic" => {
            if args.len() < 4 {
                eprintln!("Usage: agv-fleet topic <category> <serial-number>");
                std::process::exit(1);
            }
            let category = parse_category(&args[2])?;
            let identity = identity_from_env();
            println!("{}", identity.topic_scheme().topic(&args[3], category));
        }
        "schema" => {
            if args.len() < 3 {
                eprintln!("Usage: agv-fleet schema <category>");
                std::process::exit(1);
            }
            let category = parse_category(&args[2])?;
            println!("{}", schema_document(category));
        }
        "validate" => {
            if args.len() < 4 {
                eprintln!("Usage: agv-fleet validate <category> <file.json>");
                std::process::exit(1);
            }
            let category = parse_category(&args[2])?;
            let payload = std::fs::read(&args[3])
                .with_context(|| format!("Failed to read {}", args[3]))?;
            let message = decode(&payload).context("Failed to decode message")?;
            let registry = JsonSchemaRegistry::load().context("Failed to load schemas")?;

            match registry.validate(category, &message) {
                Ok(()) => println!("valid {category} message"),
                Err(violation) => {
                    for entry in &violation.violations {
                        eprintln!("{entry}");
                    }
                    std::process::exit(2);
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_category(value: &str) -> Result<Category> {
    Category::from_topic_suffix(value).ok_or_else(|| {
        let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        anyhow!("Unknown category '{value}' (expected one of {})", known.join(", "))
    })
}

fn identity_from_env() -> FleetIdentity {
    let mut identity = FleetIdentity::default();
    for (name, field) in [
        ("FLEET_INTERFACE_NAME", &mut identity.interface_name),
        ("FLEET_MAJOR_VERSION", &mut identity.major_version),
        ("FLEET_MANUFACTURER", &mut identity.manufacturer),
    ] {
        if let Ok(value) = env::var(name) {
            *field = value;
        }
    }
    identity
}

fn print_help() {
    println!(
        r#"AGV Fleet CLI

USAGE:
    agv-fleet <COMMAND> [OPTIONS]

COMMANDS:
    topic <category> <serial>     Print the topic of one vehicle
    schema <category>             Print the JSON Schema of a category
    validate <category> <file>    Validate a JSON message file
    help                          Show this help message

CATEGORIES:
    connection, factsheet, order, state, instantActions, visualization

ENVIRONMENT:
    FLEET_INTERFACE_NAME, FLEET_MAJOR_VERSION, FLEET_MANUFACTURER

EXAMPLES:
    agv-fleet topic order agv-001
    agv-fleet validate state ./state.json
"#
    );
}
