use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;

const TOKEN_FILE: &str = ".cardmarket_token";

#[derive(Parser)]
#[command(name = "cardmarket-cli")]
#[command(about = "CLI for the cardmarket API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:4000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Profile,
    UpdateProfile {
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
    },
    ChangePassword {
        #[arg(short, long)]
        current: String,
        #[arg(short, long)]
        new: String,
    },
    DeleteAccount,
    Players,
    Player {
        #[arg(short, long)]
        id: String,
    },
    Buy {
        #[arg(short, long)]
        player_id: String,
    },
    Collection,
    SetBalance {
        #[arg(short, long)]
        user_id: String,
        #[arg(short, long)]
        balance: f64,
    },
    Logout,
}

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Deserialize)]
struct AuthResponse {
    data: AuthData,
}

fn saved_token() -> String {
    fs::read_to_string(TOKEN_FILE).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
        } => {
            let res = client
                .post(format!("{}/api/auth/register", cli.url))
                .json(&json!({ "name": name, "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: AuthResponse = res.json().await?;
                fs::write(TOKEN_FILE, &body.data.token)?;
                println!("Registered and logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Registration failed: {}", res.text().await?);
            }
        }
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{}/api/auth/login", cli.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: AuthResponse = res.json().await?;
                fs::write(TOKEN_FILE, &body.data.token)?;
                println!("Logged in. Token saved to {TOKEN_FILE}");
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Profile => {
            let res = client
                .get(format!("{}/api/auth/profile", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::UpdateProfile { name, email } => {
            let res = client
                .put(format!("{}/api/auth/profile", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "name": name, "email": email }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::ChangePassword { current, new } => {
            let res = client
                .put(format!("{}/api/auth/change-password", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "currentPassword": current, "newPassword": new }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::DeleteAccount => {
            let res = client
                .delete(format!("{}/api/auth/account", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Response: {}", res.text().await?);
        }
        Commands::Players => {
            let res = client
                .get(format!("{}/api/players", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Player { id } => {
            let res = client
                .get(format!("{}/api/players/{}", cli.url, id))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Buy { player_id } => {
            let res = client
                .post(format!("{}/api/collection/buy", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "playerId": player_id }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Collection => {
            let res = client
                .get(format!("{}/api/collection", cli.url))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::SetBalance { user_id, balance } => {
            let res = client
                .patch(format!("{}/api/users/{}/balance", cli.url, user_id))
                .header("Authorization", format!("Bearer {}", saved_token()))
                .json(&json!({ "balance": balance }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Logout => {
            let token = saved_token();
            if !token.is_empty() {
                let _ = client
                    .post(format!("{}/api/auth/logout", cli.url))
                    .header("Authorization", format!("Bearer {token}"))
                    .send()
                    .await;
            }
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
    }

    Ok(())
}
