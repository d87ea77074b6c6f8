use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use rollcall_core::{AttendanceRecord, Identity, MarkOutcome, RegisterOutcome};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark attendance from a probe image
    Mark {
        /// Image file holding the faces to identify
        image: PathBuf,
    },
    /// Register a person from reference images
    Register {
        /// Person's name
        #[arg(short, long)]
        name: String,
        /// Reference image files (at least one)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Show attendance records
    View {
        /// Date (YYYY-MM-DD), today when omitted
        #[arg(conflicts_with_all = ["from", "to"])]
        date: Option<String>,
        /// Start of a date range (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// End of a date range (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// List every date with attendance records
    Dates,
    /// List registered people
    Identities,
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance1 {
    async fn mark_attendance(&self, image: &[u8]) -> zbus::Result<String>;
    async fn register_face(&self, name: &str, images: Vec<Vec<u8>>) -> zbus::Result<String>;
    async fn attendance(&self, date: &str) -> zbus::Result<String>;
    async fn attendance_between(&self, from: &str, to: &str) -> zbus::Result<String>;
    async fn attendance_dates(&self) -> zbus::Result<String>;
    async fn identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = Attendance1Proxy::new(&conn)
        .await
        .context("binding the rollcalld service")?;

    match cli.command {
        Commands::Mark { image } => {
            let bytes =
                fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let raw = proxy.mark_attendance(&bytes).await?;
            let outcomes: Vec<MarkOutcome> = serde_json::from_str(&raw)?;
            for outcome in &outcomes {
                print_mark_outcome(outcome);
            }
        }
        Commands::Register { name, images } => {
            let mut data = Vec::with_capacity(images.len());
            for path in &images {
                data.push(
                    fs::read(path).with_context(|| format!("reading {}", path.display()))?,
                );
            }
            let raw = proxy.register_face(&name, data).await?;
            let outcome: RegisterOutcome = serde_json::from_str(&raw)?;
            print_register_outcome(&outcome);
        }
        Commands::View { date, from, to } => {
            let raw = match (from, to) {
                (Some(from), Some(to)) => proxy.attendance_between(&from, &to).await?,
                _ => {
                    let date = date.unwrap_or_else(|| Local::now().date_naive().to_string());
                    proxy.attendance(&date).await?
                }
            };
            let records: Vec<AttendanceRecord> = serde_json::from_str(&raw)?;
            print_records(&records);
        }
        Commands::Dates => {
            let raw = proxy.attendance_dates().await?;
            let dates: Vec<chrono::NaiveDate> = serde_json::from_str(&raw)?;
            if dates.is_empty() {
                println!("No attendance recorded yet");
            }
            for date in dates {
                println!("{date}");
            }
        }
        Commands::Identities => {
            let raw = proxy.identities().await?;
            let names: Vec<Identity> = serde_json::from_str(&raw)?;
            if names.is_empty() {
                println!("Nobody registered yet");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Status => {
            let raw = proxy.status().await?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("rollcalld {}", value["version"].as_str().unwrap_or("?"));
            println!("  registered identities: {}", value["identities"]);
            println!("  cached encodings:      {}", value["encodings"]);
            println!("  dates with records:    {}", value["recorded_dates"]);
            println!("  match threshold:       {}", value["match_threshold"]);
        }
    }

    Ok(())
}

fn print_mark_outcome(outcome: &MarkOutcome) {
    match outcome {
        MarkOutcome::Marked {
            name,
            date,
            time,
            distance,
        } => {
            println!("Marked {name} at {time} on {date} (distance {distance:.3})");
        }
        MarkOutcome::AlreadyMarked { name, time, .. } => {
            println!("{name} was already marked today at {time}");
        }
        MarkOutcome::NoMatch { distance: Some(d) } => {
            println!("Face not recognized (nearest distance {d:.3})");
        }
        MarkOutcome::NoMatch { distance: None } => {
            println!("Face not recognized (no registered faces yet)");
        }
        MarkOutcome::NoFaceDetected => println!("No face detected in the image"),
    }
}

fn print_register_outcome(outcome: &RegisterOutcome) {
    match outcome {
        RegisterOutcome::Registered {
            name,
            images_added,
            cache_entries,
        } => {
            println!("Registered {name}: {images_added} image(s) stored, {cache_entries} encodings cached");
        }
        RegisterOutcome::InvalidIdentity { reason } => println!("Invalid name: {reason}"),
        RegisterOutcome::NoImage => println!("No images given"),
        RegisterOutcome::NoFaceDetected { image_index } => {
            println!("No face detected in image {image_index}; nothing stored");
        }
        RegisterOutcome::UnsupportedImage { image_index } => {
            println!("Image {image_index} is not JPEG or PNG; nothing stored");
        }
    }
}

fn print_records(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No records");
        return;
    }
    println!("{:<24} {:<12} {}", "Name", "Date", "Time");
    for record in records {
        println!("{:<24} {:<12} {}", record.name, record.date, record.time);
    }
}
