//! services/client/src/bin/mediauth.rs
//!
//! A command line front end over the client core. Each invocation restores the
//! stored session, runs one command and exits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use mediauth_client::{AppClient, ClientError, ClientResult, Config};
use mediauth_core::domain::{
    Credentials, MedicineDraft, OcrUpload, Prescription, Registration, Role, UploadFile,
};
use mediauth_core::intake::PrescriptionDraft;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mediauth")]
#[command(about = "Prescriptions and OCR uploads from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// patient, doctor or pharmacist
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        phone: Option<String>,
        /// Required by the server for doctors and pharmacists
        #[arg(long)]
        license: Option<String>,
    },
    /// Show the signed-in user
    Whoami,
    /// List the prescriptions visible to you
    Prescriptions,
    /// Show one prescription
    Show { id: i64 },
    /// List patients (doctors only)
    Patients,
    /// Create a draft prescription (doctors only)
    Create {
        #[arg(long)]
        patient: i64,
        #[arg(long)]
        diagnosis: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// name|dosage|frequency|duration|quantity[|instructions], repeatable
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// Issue a draft prescription (doctors only)
    Issue { id: i64 },
    /// Fill an issued prescription (pharmacists only)
    Fill { id: i64 },
    /// List your OCR uploads
    Uploads,
    /// Upload a prescription image for OCR
    Upload {
        file: PathBuf,
        /// Overrides the type guessed from the file extension
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Run OCR again on an upload
    Reprocess { id: i64 },
    /// Delete an upload
    DeleteUpload { id: i64 },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.to_ascii_lowercase().as_str() {
        "patient" => Ok(Role::Patient),
        "doctor" => Ok(Role::Doctor),
        "pharmacist" => Ok(Role::Pharmacist),
        other => Err(format!("unknown role '{other}'")),
    }
}

fn parse_item(raw: &str) -> MedicineDraft {
    let mut fields = raw.split('|').map(str::trim);
    let mut next = || fields.next().unwrap_or_default().to_string();
    MedicineDraft {
        medicine_name: next(),
        dosage: next(),
        frequency: next(),
        duration: next(),
        quantity: next().parse().ok(),
        instructions: next(),
    }
}

fn guess_media_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn print_prescription(p: &Prescription) {
    println!(
        "#{} {} [{}] {} | patient: {} | doctor: {}",
        p.id,
        p.reference,
        p.status,
        p.diagnosis,
        p.patient.display_name(),
        p.doctor.display_name(),
    );
}

fn print_upload(u: &OcrUpload) {
    println!(
        "#{} {} [{}] uploaded {}",
        u.id,
        u.original_filename,
        u.status,
        u.uploaded_at.format("%Y-%m-%d %H:%M"),
    );
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!(api = %config.api_base_url, "configuration loaded");

    // --- 2. Build the Client & Pick Up the Stored Session ---
    let app = AppClient::from_config(config)?;
    if !matches!(cli.command, Commands::Login { .. } | Commands::Register { .. }) {
        app.session.restore_session().await;
    }

    // --- 3. Run the Command ---
    run(&app, cli.command).await
}

async fn run(app: &AppClient, command: Commands) -> ClientResult<()> {
    match command {
        Commands::Login { username, password } => {
            let user = app.session.login(&Credentials { username, password }).await?;
            println!("Signed in as {} ({})", user.display_name(), user.role);
        }
        Commands::Logout => {
            app.session.logout();
            println!("Signed out");
        }
        Commands::Register {
            username,
            email,
            password,
            first_name,
            last_name,
            role,
            phone,
            license,
        } => {
            let registration = Registration {
                username,
                email,
                password_confirm: password.clone(),
                password,
                first_name,
                last_name,
                role,
                phone_number: phone,
                license_number: license,
            };
            app.session.register(&registration).await?;
            println!("Account created, you can sign in now");
        }
        Commands::Whoami => match app.session.current_user() {
            Some(user) => println!("{} <{}> ({})", user.display_name(), user.username, user.role),
            None => println!("Not signed in"),
        },
        Commands::Prescriptions => {
            for prescription in app.prescriptions.list().await? {
                print_prescription(&prescription);
            }
        }
        Commands::Show { id } => {
            let p = app.prescriptions.get(id).await?;
            print_prescription(&p);
            if !p.notes.is_empty() {
                println!("  notes: {}", p.notes);
            }
            for item in &p.items {
                println!(
                    "  - {} {}, {} for {} (qty {})",
                    item.medicine_name, item.dosage, item.frequency, item.duration, item.quantity
                );
            }
        }
        Commands::Patients => {
            for patient in app.prescriptions.patients().await? {
                println!("#{} {} ({})", patient.id, patient.display_name(), patient.username);
            }
        }
        Commands::Create {
            patient,
            diagnosis,
            notes,
            items,
        } => {
            let draft = PrescriptionDraft {
                patient_id: Some(patient),
                diagnosis,
                notes,
                items: items.iter().map(|raw| parse_item(raw)).collect(),
            };
            match app.prescriptions.create(&draft).await? {
                Some(created) => print_prescription(&created),
                None => println!("Prescription created"),
            }
        }
        Commands::Issue { id } => {
            // Load the board first so the status gate sees the current copy.
            app.prescriptions.list().await?;
            print_prescription(&app.prescriptions.issue(id).await?);
        }
        Commands::Fill { id } => {
            app.prescriptions.list().await?;
            print_prescription(&app.prescriptions.fill(id).await?);
        }
        Commands::Uploads => {
            for upload in app.ocr.list().await? {
                print_upload(&upload);
            }
        }
        Commands::Upload { file, media_type } => {
            let media_type = media_type.unwrap_or_else(|| guess_media_type(&file));
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| ClientError::Internal(format!("{}: {}", file.display(), e)))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let upload = UploadFile::new(file_name, media_type, Bytes::from(bytes));
            match app.ocr.upload(upload).await? {
                Some(record) => print_upload(&record),
                None => println!("Upload accepted"),
            }
        }
        Commands::Reprocess { id } => match app.ocr.reprocess(id).await? {
            Some(record) => print_upload(&record),
            None => println!("Reprocessing started"),
        },
        Commands::DeleteUpload { id } => {
            app.ocr.delete(id).await?;
            println!("Upload deleted");
        }
    }
    Ok(())
}
