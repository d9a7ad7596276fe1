// Operator CLI for the security gate and credential storage.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use obsguard::audit::FileAuditSink;
use obsguard::challenge::{ChallengeProvider, TerminalChallenge};
use obsguard::credentials::CredentialConfig;
use obsguard::error::ObsGuardError;
use obsguard::gate::{AccessDecision, SecurityPolicy};
use obsguard::manager::AccessGate;
use obsguard::policy::SecurityProfile;
use obsguard::store::EncryptedFile;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "obsguard")]
#[command(about = "Multi-level security gate for object-storage operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Security levels file (the sealed pair is <file>.enc / <file>.salt)
    #[arg(long, global = true, default_value = "obs_security_levels.json")]
    security_file: PathBuf,

    /// Credentials file (the sealed pair is <file>.enc / <file>.salt)
    #[arg(long, global = true, default_value = "obs_config.json")]
    config_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Multi-level security management
    Security {
        #[command(subcommand)]
        command: SecurityCommand,
    },

    /// Credential file management
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommand,
    },
}

#[derive(Subcommand)]
enum SecurityCommand {
    /// Set or clear every tier password and seal the result
    Setup {
        /// Apply a preset profile (basic, standard, advanced, admin,
        /// enterprise) and seal the credentials under the same master password
        #[arg(long)]
        profile: Option<SecurityProfile>,
    },

    /// Show tiers, their operations and protection status
    List,

    /// Authorize an operation as a storage command would
    Check {
        /// Operation name (list, archive, delete, ...)
        operation: String,

        /// Extra context shown in the confirmation prompt
        #[arg(short, long)]
        details: Option<String>,

        /// Run with the gate disabled
        #[arg(long)]
        disabled: bool,

        /// Append the decision to a JSON-lines audit file
        #[arg(long)]
        audit_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CredentialsCommand {
    /// Seal the plaintext credentials file
    Encrypt {
        /// Delete the plaintext file afterwards
        #[arg(long)]
        remove_plaintext: bool,
    },

    /// Print the sealed credentials (secret redacted)
    Decrypt,

    /// Reseal under a new password
    ChangePassword,

    /// Restrict the plaintext credentials file to its owner
    SecurePermissions,

    /// Write a sample credentials file
    Sample,

    /// Load credentials from every source and check required fields
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            match &e {
                ObsGuardError::AuthorizationDenied { .. } => eprintln!("Access denied: {e}"),
                ObsGuardError::Configuration(_) => eprintln!("Configuration invalid: {e}"),
                _ => eprintln!("Operation failed: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, ObsGuardError> {
    match cli.command {
        Commands::Security { command } => {
            run_security(command, cli.security_file, cli.config_file)
        }
        Commands::Credentials { command } => run_credentials(command, cli.config_file),
    }
}

fn run_security(
    command: SecurityCommand,
    path: PathBuf,
    config_path: PathBuf,
) -> Result<ExitCode, ObsGuardError> {
    let file = EncryptedFile::new(path);
    match command {
        SecurityCommand::Setup { profile: None } => {
            let mut policy = SecurityPolicy::load(file, TerminalChallenge)?;
            println!("Multi-level security setup");
            println!("Leave a tier password empty to keep that tier unrestricted.");
            policy.configure()?;
            println!("Security levels configured and encrypted.");
        }
        SecurityCommand::Setup {
            profile: Some(profile),
        } => {
            let mut terminal = TerminalChallenge;
            let config = CredentialConfig::new(config_path);
            let (credentials, _) = config.load(&mut terminal, |name| std::env::var(name).ok())?;
            credentials.validate()?;

            println!("Setting up the {profile} profile: {}", profile.description());
            let master = new_password(&mut terminal, "Create master password: ")?;
            config.create_encrypted(&credentials, &master)?;

            let mut policy = SecurityPolicy::load(file, terminal)?;
            policy.apply_profile(profile, &master)?;
            println!("Credentials and security levels encrypted.");
        }
        SecurityCommand::List => {
            let policy = SecurityPolicy::load(file, TerminalChallenge)?;
            for level in policy.list_levels() {
                let status = if level.protected { "protected" } else { "unprotected" };
                println!("{} - {status}", level.tier.as_str().to_uppercase());
                println!("   Operations: {}", level.operations.join(", "));
                println!("   Description: {}", level.description);
            }
            let settings = policy.settings();
            println!("Settings:");
            println!("   Require confirmation: {}", settings.require_confirmation);
            println!("   Log all operations: {}", settings.log_all_operations);
            println!("   Session timeout: {} seconds", settings.session_timeout);
        }
        SecurityCommand::Check {
            operation,
            details,
            disabled,
            audit_file,
        } => {
            let mut gate = if disabled {
                AccessGate::Disabled(TerminalChallenge)
            } else {
                let mut policy = SecurityPolicy::load(file, TerminalChallenge)?;
                if let Some(path) = audit_file {
                    policy.add_audit_sink(Box::new(FileAuditSink::new(path)?));
                }
                AccessGate::Enabled(policy)
            };
            match gate.check(&operation, details.as_deref())? {
                AccessDecision::Granted => println!("Access granted for '{operation}'"),
                AccessDecision::Denied(reason) => {
                    return Err(ObsGuardError::AuthorizationDenied {
                        operation,
                        reason: reason.to_string(),
                    })
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_credentials(command: CredentialsCommand, path: PathBuf) -> Result<ExitCode, ObsGuardError> {
    let config = CredentialConfig::new(path);
    let mut terminal = TerminalChallenge;
    match command {
        CredentialsCommand::Encrypt { remove_plaintext } => {
            let password = new_password(&mut terminal, "Enter password to encrypt configuration: ")?;
            config.encrypt_plaintext(&password)?;
            if remove_plaintext {
                config.remove_plaintext()?;
            }
            let file = config.encrypted_file();
            println!(
                "Encrypted configuration written to {} and {}",
                file.ciphertext_path().display(),
                file.salt_path().display()
            );
            println!("Keep your password safe - it cannot be recovered.");
        }
        CredentialsCommand::Decrypt => {
            let password =
                Zeroizing::new(terminal.ask_secret("Enter password to decrypt configuration: ")?);
            let credentials = config.decrypt(&password)?;
            println!("{credentials:#?}");
        }
        CredentialsCommand::ChangePassword => {
            let old = Zeroizing::new(terminal.ask_secret("Enter current password: ")?);
            let new = new_password(&mut terminal, "Enter new password: ")?;
            config.change_password(&old, &new)?;
            println!("Password changed.");
        }
        CredentialsCommand::SecurePermissions => {
            if config.secure_file_permissions() {
                println!("Permissions on {} set to 600", config.plaintext_path().display());
            } else {
                println!("Permissions on {} were not changed", config.plaintext_path().display());
            }
        }
        CredentialsCommand::Sample => {
            let path = config.write_sample()?;
            println!("Sample configuration created: {}", path.display());
            println!("Copy it to {} and fill in your credentials.", config.plaintext_path().display());
        }
        CredentialsCommand::Validate => {
            let (credentials, source) =
                config.load(&mut terminal, |name| std::env::var(name).ok())?;
            credentials.validate()?;
            println!("Credentials valid (source: {source:?}, server: {})", credentials.server);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn new_password(
    challenge: &mut impl ChallengeProvider,
    prompt: &str,
) -> Result<Zeroizing<String>, ObsGuardError> {
    let password = Zeroizing::new(challenge.ask_secret(prompt)?);
    let confirm = Zeroizing::new(challenge.ask_secret("Confirm password: ")?);
    if *password != *confirm {
        return Err(ObsGuardError::Configuration("passwords do not match".into()));
    }
    Ok(password)
}
