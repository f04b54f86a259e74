//! List commands implementation

use crate::drivers;

/// List all drivers compiled into this binary
pub fn list_drivers() {
    let drivers = drivers::available_drivers();

    if drivers.is_empty() {
        println!("No drivers available (recompile with driver features enabled)");
        return;
    }

    println!("Available drivers:");
    println!();
    for d in &drivers {
        if d.aliases.is_empty() {
            println!("  {:10} - {}", d.name, d.description);
        } else {
            println!(
                "  {:10} - {} [aliases: {}]",
                d.name,
                d.description,
                d.aliases.join(", ")
            );
        }
    }
}
