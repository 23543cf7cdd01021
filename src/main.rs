use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::error;

use stitch_book::config::Config;
use stitch_book::photo::{ImageCodec, RawImage};
use stitch_book::state::data::{ImageRef, ImageSlot, Project, ProjectKind};
use stitch_book::state::edit::EditSession;
use stitch_book::state::feed::ChangeEvent;
use stitch_book::store::{Backend, BackendKind, LocalStore, RealtimeHub};
use stitch_book::ProjectRepository;

/// Catalog of knitting and crochet projects
#[derive(Parser, Debug)]
#[command(name = "stitch-book", version, about)]
struct Cli {
    /// Use this backend instead of the configured one (local | remote)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Read configuration from this file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every project
    List,
    /// Create a project
    Add(FieldArgs),
    /// Change fields or photos of a project
    Edit {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete a project and its photos
    Delete { id: String },
}

#[derive(Args, Debug)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,
    /// knit | crochet
    #[arg(long = "type")]
    kind: Option<ProjectKind>,
    #[arg(long)]
    needle_size: Option<String>,
    #[arg(long)]
    yarn_name: Option<String>,
    #[arg(long)]
    yarn_color: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    youtube_url: Option<String>,
    /// Finished-object photo
    #[arg(long)]
    main_image: Option<PathBuf>,
    /// Yarn photo
    #[arg(long)]
    yarn_image: Option<PathBuf>,
    #[arg(long, conflicts_with = "main_image")]
    clear_main: bool,
    #[arg(long, conflicts_with = "yarn_image")]
    clear_yarn: bool,
}

impl FieldArgs {
    /// Fill the open form the way a user would
    async fn apply(self, session: &mut EditSession) -> Result<(), Box<dyn Error>> {
        let draft = &mut session.draft;
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(kind) = self.kind {
            draft.kind = kind;
        }
        if let Some(value) = self.needle_size {
            draft.needle_size = value;
        }
        if let Some(value) = self.yarn_name {
            draft.yarn_name = value;
        }
        if let Some(value) = self.yarn_color {
            draft.yarn_color = value;
        }
        if let Some(value) = self.notes {
            draft.notes = value;
        }
        if let Some(value) = self.youtube_url {
            draft.youtube_url = value;
        }

        let photos = [
            (ImageSlot::Main, self.main_image, self.clear_main),
            (ImageSlot::Yarn, self.yarn_image, self.clear_yarn),
        ];
        for (slot, path, clear) in photos {
            if clear {
                session.clear_image(slot);
            }
            if let Some(path) = path {
                let raw = RawImage::from_path(&path).await?;
                let preview = session.select_image(slot, raw)?;
                println!(
                    "🖼️  {} photo {} selected ({} KB preview)",
                    slot,
                    path.display(),
                    preview.len() / 1024
                );
            }
        }

        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(e.as_ref());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let backend = match cli.backend.unwrap_or(config.backend) {
        BackendKind::Local => Backend::Local(LocalStore::open(&config.database_path()?)?),
        BackendKind::Remote => {
            let hub = RealtimeHub::open(&config.remote_root()?).await?;
            Backend::Remote(hub.store())
        }
    };

    let repo = Arc::new(ProjectRepository::new(backend, ImageCodec::new(config.image)));
    repo.on_change(|event| {
        if let ChangeEvent::ReadFailed(reason) = event {
            error!("❌ Failed to load projects: {}", reason);
        }
    });
    repo.load().await?;
    // Lives until the process exits
    let _sync = repo.start_sync();

    match cli.command {
        Command::List => print_catalog(&repo.list()),
        Command::Add(fields) => {
            let mut session = repo.open_new()?;
            fields.apply(&mut session).await?;
            let project = repo.save(session).await?;
            println!("✅ Created {} ({})", project.name, project.id);
        }
        Command::Edit { id, fields } => {
            let mut session = repo.open_edit(&id)?;
            fields.apply(&mut session).await?;
            let project = repo.save(session).await?;
            println!("✅ Saved {} ({})", project.name, project.id);
        }
        Command::Delete { id } => {
            repo.delete(&id).await?;
            println!("🗑️  Deleted {}", id);
        }
    }

    Ok(())
}

fn print_catalog(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects yet. Add one with `stitch-book add --name ...`");
        return;
    }

    for project in projects {
        println!("🧶 {}  [{}]  {}", project.name, project.kind.label(), project.id);

        if !project.needle_size.is_empty() {
            println!("   Needle: {}", project.needle_size);
        }
        match (project.yarn_name.is_empty(), project.yarn_color.is_empty()) {
            (false, false) => println!("   Yarn: {} ({})", project.yarn_name, project.yarn_color),
            (false, true) => println!("   Yarn: {}", project.yarn_name),
            (true, false) => println!("   Color: {}", project.yarn_color),
            (true, true) => {}
        }
        if !project.notes.is_empty() {
            println!("   Notes: {}", project.notes);
        }
        if !project.youtube_url.is_empty() {
            println!("   📺 {}", project.youtube_url);
        }
        for slot in ImageSlot::ALL {
            match project.image(slot) {
                Some(ImageRef::Url(url)) => println!("   {} photo: {}", slot, url),
                Some(ImageRef::Inline(data)) => {
                    println!("   {} photo: inline ({} KB)", slot, data.len() / 1024)
                }
                None => {}
            }
        }
        println!("   Created {}", project.created_at.format("%Y-%m-%d %H:%M"));
    }
}

fn report(err: &dyn Error) {
    eprintln!("error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}
