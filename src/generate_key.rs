// generate_key.rs
// Utility to generate a new key for encrypting stored Google tokens

use google_link_api::services::EncryptionService;

fn main() {
    println!("Generating new AES-256 token encryption key...\n");

    let key = EncryptionService::generate_key();

    println!("✅ Key generated successfully!\n");
    println!("Add this to your .env file:");
    println!("─────────────────────────────────────────────────");
    println!("TOKEN_ENCRYPTION_KEY={}", key);
    println!("─────────────────────────────────────────────────");
    println!("\n⚠️  IMPORTANT:");
    println!("  • Keep this key secure and never commit it to version control");
    println!("  • Rotating it makes previously stored tokens unreadable; users must relink Google");
}
