use clap::{Arg, Command};
use std::path::Path;
use std::process;

use trailpass::email::{SecureEmailManager, SmtpNotifier};
use trailpass::security::SecretVault;
use trailpass::utils::{initialize_logging, is_valid_email, read_line};

fn prompt(label: &str) -> Result<String, Box<dyn std::error::Error>> {
    println!("{}:", label);
    let value = read_line()?;
    if value.is_empty() {
        return Err(format!("{} cannot be empty", label).into());
    }
    Ok(value)
}

fn init_secrets() -> Result<(), Box<dyn std::error::Error>> {
    let vault = SecretVault::new()?;
    if vault.initialize_if_needed()? {
        println!("Signing secrets generated and stored in the system keyring.");
    } else {
        // Make sure what is there is usable
        vault.load()?;
        println!("Signing secrets already present; nothing to do.");
    }
    Ok(())
}

fn setup_email() -> Result<(), Box<dyn std::error::Error>> {
    let host = prompt("SMTP host (e.g. smtp.gmail.com)")?;
    let port: u16 = prompt("SMTP port (e.g. 587)")?
        .parse()
        .map_err(|_| "SMTP port must be a number between 1 and 65535")?;
    let username = prompt("SMTP username (sender address)")?;
    if !is_valid_email(&username) {
        return Err("SMTP username must be an email address".into());
    }

    println!("SMTP password (input hidden):");
    let password = rpassword::read_password()?;
    if password.is_empty() {
        return Err("SMTP password cannot be empty".into());
    }

    SecureEmailManager::new()?.store_credentials(&username, &password, &host, port)?;
    log::info!("SMTP credentials updated for {}", host);
    println!("Email configuration saved.");
    Ok(())
}

fn test_email(to: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !is_valid_email(to) {
        return Err(format!("'{}' is not a valid email address", to).into());
    }
    let notifier = SmtpNotifier::from_keyring("Trailpass")?;
    notifier.send_plain(
        to,
        "Trailpass test email",
        "If you can read this, outgoing email is configured correctly.",
    )?;
    println!("Test email sent to {} from {}.", to, notifier.sender());
    Ok(())
}

fn main() {
    if let Err(e) = initialize_logging(Path::new("trailpass.log")) {
        eprintln!("Warning: logging unavailable: {}", e);
    }

    let matches = Command::new("trailpass")
        .version("0.1.0")
        .about("Operator tooling for the trailpass credential service")
        .subcommand_required(true)
        .subcommand(
            Command::new("init-secrets")
                .about("Generate token signing secrets in the system keyring"),
        )
        .subcommand(
            Command::new("setup-email").about("Store SMTP credentials in the system keyring"),
        )
        .subcommand(
            Command::new("test-email")
                .about("Send a test message with the stored SMTP credentials")
                .arg(
                    Arg::new("to")
                        .help("Recipient address")
                        .required(true)
                        .value_parser(clap::value_parser!(String)),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("init-secrets", _)) => init_secrets(),
        Some(("setup-email", _)) => setup_email(),
        Some(("test-email", sub_matches)) => match sub_matches.get_one::<String>("to") {
            Some(to) => test_email(to),
            None => Err("missing recipient".into()),
        },
        _ => Err("unknown command".into()),
    };

    if let Err(e) = result {
        log::error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
