//! CLI tool printing the argon2 hash of the administrator password.
//!
//! Usage: `hash-password <password>`
//!
//! Put the output in `admin.password_hash` of `config.yml`.

use std::process;

use marigold::services::hash_password;

fn main() {
    let Some(password) = std::env::args().nth(1) else {
        eprintln!("usage: hash-password <password>");
        process::exit(2);
    };

    match hash_password(&password) {
        Ok(hash) => println!("{}", hash),
        Err(e) => {
            eprintln!("failed to hash password: {:#}", e);
            process::exit(1);
        }
    }
}
