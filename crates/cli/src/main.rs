use clap::{Args, Parser, Subcommand};
use cpr_core::{
    CarePlan, CarePlanStatus, Caller, ContentModifications, CoreConfig, DraftRequest, NonEmptyText,
    ReviewEngine, Reviewer, ShardableUuid, StoreBackend, VersionStamp,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cpr")]
#[command(about = "Care plan review CLI")]
struct Cli {
    /// Storage root (defaults to CPR_DATA_DIR, then `careplan_data`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Who is acting
    #[arg(long = "as", global = true, default_value = "cli")]
    caller_id: String,
    /// patient | clinician | admin
    #[arg(long, global = true, default_value = "clinician")]
    role: String,
    /// The caller's own patient id, required with `--role patient`
    #[arg(long = "caller-patient", global = true)]
    caller_patient_id: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

/// The version and revision last read.
#[derive(Args)]
struct Stamp {
    careplan_id: String,
    #[arg(long)]
    expected_version: u64,
    #[arg(long)]
    expected_revision: u64,
}

/// The clinician recorded on the review.
#[derive(Args)]
struct ReviewerArgs {
    #[arg(long)]
    reviewer_id: String,
    #[arg(long)]
    reviewer_name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a draft care plan
    Generate {
        patient_id: String,
        chief_complaint: String,
        /// Generate even if the patient has an open plan
        #[arg(long)]
        force: bool,
    },
    /// Show a care plan as JSON
    Show { careplan_id: String },
    /// List care plans, optionally by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// List a patient's care plans
    Patient { patient_id: String },
    /// Submit a draft for review
    Submit(Stamp),
    /// Approve a plan under review
    Approve {
        #[command(flatten)]
        stamp: Stamp,
        #[command(flatten)]
        reviewer: ReviewerArgs,
        #[arg(long)]
        comments: Option<String>,
        /// JSON file of content modifications
        #[arg(long)]
        modifications: Option<PathBuf>,
    },
    /// Deny a plan under review
    Deny {
        #[command(flatten)]
        stamp: Stamp,
        #[command(flatten)]
        reviewer: ReviewerArgs,
        #[arg(long)]
        comments: String,
    },
    /// Replace plan content
    Edit {
        #[command(flatten)]
        stamp: Stamp,
        #[command(flatten)]
        reviewer: ReviewerArgs,
        /// JSON file of content modifications
        modifications: PathBuf,
        #[arg(long)]
        comments: Option<String>,
    },
    /// Send an approved plan to the patient
    Send(Stamp),
    /// Mark a sent plan as active
    Activate(Stamp),
    /// Mark an active plan as completed
    Complete(Stamp),
    /// Show the review history
    History { careplan_id: String },
    /// Show every stored revision
    Revisions { careplan_id: String },
}

impl Stamp {
    fn parse(&self) -> Result<(ShardableUuid, VersionStamp), Box<dyn std::error::Error>> {
        Ok((
            ShardableUuid::parse(&self.careplan_id)?,
            VersionStamp::new(self.expected_version, self.expected_revision),
        ))
    }
}

impl ReviewerArgs {
    fn parse(&self) -> Result<Reviewer, Box<dyn std::error::Error>> {
        Ok(Reviewer::new(&self.reviewer_id, &self.reviewer_name)?)
    }
}

fn read_modifications(path: &PathBuf) -> Result<ContentModifications, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let de = &mut serde_json::Deserializer::from_str(&raw);
    Ok(serde_path_to_error::deserialize(de)?)
}

fn print_summary(careplan: &CarePlan) {
    println!(
        "{}  patient={}  status={}  v{} r{}  modified={}",
        careplan.careplan_id,
        careplan.patient_id,
        careplan.status,
        careplan.version,
        careplan.revision,
        careplan.last_modified.to_rfc3339()
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .map(|d| d.to_string_lossy().into_owned())
        .or_else(|| std::env::var("CPR_DATA_DIR").ok());
    let cfg = CoreConfig::from_values(data_dir, Some(StoreBackend::File.to_string()))?;
    let engine = ReviewEngine::with_store(cpr_core::open_store(&cfg)?);
    let caller = Caller::from_parts(&cli.caller_id, &cli.role, cli.caller_patient_id.as_deref())?;

    match cli.command {
        Some(Commands::Generate {
            patient_id,
            chief_complaint,
            force,
        }) => {
            let request = DraftRequest {
                patient_id: NonEmptyText::new(&patient_id)?,
                chief_complaint: NonEmptyText::new(&chief_complaint)?,
                override_existing: force,
            };
            let careplan = engine.create_draft(&caller, &request)?;
            print_summary(&careplan);
        }
        Some(Commands::Show { careplan_id }) => {
            let careplan = engine.get(&caller, &ShardableUuid::parse(&careplan_id)?)?;
            println!("{}", serde_json::to_string_pretty(&careplan)?);
        }
        Some(Commands::List { status }) => {
            let status = status.map(|s| s.parse::<CarePlanStatus>()).transpose()?;
            let plans = engine.list_by_status(&caller, status)?;
            if plans.is_empty() {
                println!("No care plans found.");
            }
            plans.iter().for_each(print_summary);
        }
        Some(Commands::Patient { patient_id }) => {
            let plans = engine.list_by_patient(&caller, &patient_id)?;
            if plans.is_empty() {
                println!("No care plans found.");
            }
            plans.iter().for_each(print_summary);
        }
        Some(Commands::Submit(stamp)) => {
            let (id, stamp) = stamp.parse()?;
            print_summary(&engine.submit_for_review(&caller, &id, stamp)?);
        }
        Some(Commands::Approve {
            stamp,
            reviewer,
            comments,
            modifications,
        }) => {
            let (id, stamp) = stamp.parse()?;
            let modifications = modifications.as_ref().map(read_modifications).transpose()?;
            let careplan = engine.approve(
                &caller,
                &id,
                stamp,
                &reviewer.parse()?,
                comments.as_deref(),
                modifications.as_ref(),
            )?;
            print_summary(&careplan);
        }
        Some(Commands::Deny {
            stamp,
            reviewer,
            comments,
        }) => {
            let (id, stamp) = stamp.parse()?;
            let careplan = engine.deny(&caller, &id, stamp, &reviewer.parse()?, Some(comments.as_str()))?;
            print_summary(&careplan);
        }
        Some(Commands::Edit {
            stamp,
            reviewer,
            modifications,
            comments,
        }) => {
            let (id, stamp) = stamp.parse()?;
            let modifications = read_modifications(&modifications)?;
            let careplan = engine.edit(
                &caller,
                &id,
                stamp,
                &reviewer.parse()?,
                &modifications,
                comments.as_deref(),
            )?;
            print_summary(&careplan);
        }
        Some(Commands::Send(stamp)) => {
            let (id, stamp) = stamp.parse()?;
            let outcome = engine.send_to_patient(&caller, &id, stamp)?;
            print_summary(&outcome.careplan);
            match outcome.receipt {
                Some(receipt) => println!(
                    "Delivered via {} (confirmation {})",
                    receipt.method, receipt.confirmation_id
                ),
                None => eprintln!("Sent, but delivery failed; see the log"),
            }
        }
        Some(Commands::Activate(stamp)) => {
            let (id, stamp) = stamp.parse()?;
            print_summary(&engine.activate(&caller, &id, stamp)?);
        }
        Some(Commands::Complete(stamp)) => {
            let (id, stamp) = stamp.parse()?;
            print_summary(&engine.complete(&caller, &id, stamp)?);
        }
        Some(Commands::History { careplan_id }) => {
            let reviews = engine.get_history(&caller, &ShardableUuid::parse(&careplan_id)?)?;
            if reviews.is_empty() {
                println!("No reviews yet.");
            }
            for review in reviews {
                println!(
                    "{}  {}  {} ({})  -> v{}  {}",
                    review.review_date.to_rfc3339(),
                    review.status,
                    review.reviewer_name,
                    review.reviewer_id,
                    review.resulting_version,
                    review.comments.unwrap_or_default()
                );
            }
        }
        Some(Commands::Revisions { careplan_id }) => {
            let revisions = engine.revisions(&caller, &ShardableUuid::parse(&careplan_id)?)?;
            for r in revisions {
                println!(
                    "r{}  v{}  {}  {}  by {} ({})  {}",
                    r.revision,
                    r.version,
                    r.status,
                    r.action.as_str(),
                    r.actor_name,
                    r.actor_id,
                    r.recorded_at.to_rfc3339()
                );
            }
        }
        None => {
            println!("Use 'cpr --help' for commands");
        }
    }

    Ok(())
}
