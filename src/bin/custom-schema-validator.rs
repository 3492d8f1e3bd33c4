//! # Custom Schema Validator
//!
//! A command-line utility for checking the custom schema declaration accepted by
//! the connector's `customSchemasJson` setting before it is deployed.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin custom-schema-validator schemas/custom.json
//! ```
//!
//! ## Output Examples
//!
//! ```text
//! Validating custom schemas: schemas/custom.json
//! ✓ Declaration is valid!
//!
//! Mapped attributes: 3
//!   - Employment.costCenter (Int)
//!   - Employment.badges (String, multi-valued)
//!   - Employment.remote (Boolean)
//! Ignored nodes: 1
//!   - Legacy (top-level schemas must be objects)
//! ```
//!
//! ```text
//! Validating custom schemas: broken.json
//! ❌ Validation failed: Configuration error: customSchemas[0]: name cannot be empty
//! ```
//!
//! ## Exit Codes
//!
//! - `0`: The declaration is valid
//! - `1`: The file could not be read or the declaration is invalid
//!
//! The same parser the connector runs at configuration time is used here, so a
//! declaration accepted by this tool is accepted by the connector.

use directory_connector::schema::{CustomSchemaDescriptor, CustomSchemaType, CustomSchemas, parse_custom_schemas};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <custom-schema-file>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} schemas/custom.json", args[0]);
        process::exit(1);
    }

    let path = Path::new(&args[1]);
    if !path.is_file() {
        eprintln!("Error: '{}' is not a file", path.display());
        process::exit(1);
    }

    println!("Validating custom schemas: {}", path.display());
    match load(path) {
        Ok(descriptors) => {
            println!("✓ Declaration is valid!");
            print_summary(&descriptors);
        }
        Err(e) => {
            eprintln!("❌ Validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(path: &Path) -> Result<Vec<CustomSchemaDescriptor>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_custom_schemas(&content)?)
}

fn ignored_nodes(descriptors: &[CustomSchemaDescriptor]) -> Vec<(String, &'static str)> {
    let mut ignored = Vec::new();
    for schema in descriptors {
        if schema.schema_type != CustomSchemaType::Object {
            ignored.push((schema.name.clone(), "top-level schemas must be objects"));
            continue;
        }
        for inner in &schema.inner_schemas {
            if inner.schema_type == CustomSchemaType::Object {
                ignored.push((
                    format!("{}.{}", schema.name, inner.name),
                    "nesting beyond one level is not mapped",
                ));
            }
        }
    }
    ignored
}

fn print_summary(descriptors: &[CustomSchemaDescriptor]) {
    let schemas = CustomSchemas::new(descriptors);

    println!();
    println!("Mapped attributes: {}", schemas.fields().len());
    for field in schemas.fields() {
        let multi = if field.multi_valued { ", multi-valued" } else { "" };
        println!("  - {} ({:?}{})", field.attribute_name(), field.field_type, multi);
    }

    let ignored = ignored_nodes(descriptors);
    if !ignored.is_empty() {
        println!("Ignored nodes: {}", ignored.len());
        for (name, reason) in ignored {
            println!("  - {} ({})", name, reason);
        }
    }
}
