//! Seed script for the cardmarket store.
//!
//! Populates the database with:
//! - a demo account (with a starting balance, so purchases work out of the box)
//! - a roster of player cards across all four positions
//! Run: cargo run --bin seed_data

use cardmarket::auth::hash_password;
use cardmarket::models::{NewPlayer, Position};
use cardmarket::storage::Storage;
use rust_decimal::Decimal;
use serde_json::json;

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "market_data".to_string());
    let storage = Storage::open(&data_dir)?;

    // Demo account; ignored if it already exists from a previous run.
    let password_hash = hash_password("demo-pass1".to_string(), 12).await?;
    match storage.create_user(
        "Demo User",
        "demo@cardmarket.dev",
        &password_hash,
        Some(dec("100.0")),
    ) {
        Ok(user) => println!("✅ Created demo user {} ({})", user.email, user.id),
        Err(_) => println!("ℹ️ Demo user already exists, skipping"),
    }

    let existing = storage.list_players()?;
    if !existing.is_empty() {
        println!("ℹ️ Players already seeded ({} cards), skipping", existing.len());
        return Ok(());
    }

    let roster = [
        ("Robin Olsen", "Malmö FF", Position::Goalkeeper, "4.5"),
        ("Viktor Johansson", "Stockholm United", Position::Goalkeeper, "4.0"),
        ("Victor Lindelöf", "Västerås IK", Position::Defender, "5.5"),
        ("Hjalmar Ekdal", "Djurgården", Position::Defender, "4.5"),
        ("Gabriel Gudmundsson", "Halmstad", Position::Defender, "5.0"),
        ("Dejan Kulusevski", "Stockholm United", Position::Midfielder, "8.0"),
        ("Yasin Ayari", "AIK", Position::Midfielder, "6.5"),
        ("Anton Salétros", "AIK", Position::Midfielder, "5.5"),
        ("Hugo Larsson", "Malmö FF", Position::Midfielder, "7.0"),
        ("Alexander Isak", "AIK", Position::Forward, "11.5"),
        ("Viktor Gyökeres", "IF Brommapojkarna", Position::Forward, "11.0"),
        ("Anthony Elanga", "Malmö FF", Position::Forward, "7.5"),
    ];

    for (name, team, position, price) in roster {
        let player = storage.create_player(NewPlayer {
            name: name.to_string(),
            team: team.to_string(),
            position,
            price: dec(price),
            description: Some(format!("{name} ({team})")),
            image_url: None,
            stats: Some(json!({ "appearances": 0, "goals": 0, "assists": 0 })),
        })?;
        println!("  • {} [{}] {:?} {}", player.name, player.team, player.position, player.price);
    }

    println!("✅ Seeded {} player cards into {data_dir}", roster.len());
    println!("🔑 Demo login: demo@cardmarket.dev / demo-pass1");
    Ok(())
}
