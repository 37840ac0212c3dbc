use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, watch};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zando_client::app::Account;
use zando_client::config::parse_api_url;
use zando_client::notifications::{NotificationEvent, Severity};
use zando_client::progress::{progress_channel, UploadProgress};
use zando_client::{ApiError, App, Backend, ClientConfig};
use zando_protocol::{
    mutations_by_category, AnalysisResult, ProfileUpdate, RegisterRequest, ReportMetadata,
    ReportType, UserProfile,
};
use zeroize::Zeroizing;

/// Toasts already reach stderr through the printer, so library events stay
/// quiet unless `RUST_LOG` asks for them.
const DEFAULT_LOG_FILTER: &str = "zando_cli=info,zando_client=warn";

#[derive(Parser, Debug)]
#[command(name = "zando", about = "Upload a raw DNA export and get a skincare report")]
struct Args {
    /// Backend base URL (overrides ZANDO_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(long, global = true, value_name = "DIR")]
    session_dir: Option<PathBuf>,

    /// HTTP timeout in seconds, clamped to 5..=300.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print results as JSON on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the export formats the backend accepts.
    Formats,
    Validate {
        file: PathBuf,
    },
    Upload {
        file: PathBuf,
    },
    /// List files uploaded earlier.
    Uploads {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show parsed SNPs for an uploaded file.
    Data {
        hash: String,
        #[arg(long, default_value_t = 20)]
        rows: usize,
    },
    Analyze {
        #[arg(long, required_unless_present = "analysis_id")]
        hash: Option<String>,
        #[arg(long)]
        analysis_id: Option<String>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    #[command(name = "result")]
    ShowResult {
        id: String,
    },
    /// Check whether a file already has an analysis.
    Exists {
        hash: String,
    },
    #[command(subcommand)]
    Report(ReportCommand),
    /// Upload, analyze and generate a report in one go.
    Run {
        file: PathBuf,
        #[arg(long = "type", default_value = "markdown")]
        report_type: ReportType,
        /// Also download the rendered report here.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    Login {
        #[arg(long)]
        username: String,
        /// Falls back to ZANDO_PASSWORD, then a prompt.
        #[arg(long)]
        password: Option<String>,
    },
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Show who is signed in.
    Me,
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in with a Google identity token.
    GoogleLogin {
        #[arg(long)]
        token: String,
    },
    Logout,
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    Generate {
        #[arg(long = "type", default_value = "markdown")]
        report_type: ReportType,
        #[arg(long, required_unless_present = "analysis_id")]
        hash: Option<String>,
        #[arg(long)]
        analysis_id: Option<String>,
    },
    Show {
        id: String,
    },
    List,
    Download {
        id: String,
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
    },
}

impl Command {
    fn is_sign_in(&self) -> bool {
        matches!(
            self,
            Command::Login { .. } | Command::Register { .. } | Command::GoogleLogin { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&args)?;
    debug!(api_url = %config.api_url, session = %config.session_dir.display(), "config loaded");
    let app = App::from_config(config)?;
    let mut toasts = ToastPrinter::new(app.notifications.subscribe());

    let outcome = run(&app, &args, &mut toasts).await;
    toasts.flush();

    if let Err(e) = &outcome {
        let needs_login = e
            .downcast_ref::<ApiError>()
            .map(ApiError::requires_login)
            .unwrap_or(false);
        if needs_login && !args.command.is_sign_in() {
            eprintln!("session expired, run `zando login`");
            std::process::exit(2);
        }
    }
    outcome
}

fn build_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut cfg = ClientConfig::from_env()?;
    if let Some(url) = args.api_url.as_deref() {
        cfg.api_url = parse_api_url(url)?;
    }
    if let Some(dir) = args.session_dir.clone() {
        cfg.session_dir = dir;
    }
    if let Some(secs) = args.timeout {
        cfg.http_timeout = Duration::from_secs(secs.clamp(5, 300));
    }
    Ok(cfg)
}

async fn run(app: &App, args: &Args, toasts: &mut ToastPrinter) -> anyhow::Result<()> {
    let json = args.json;
    match &args.command {
        Command::Formats => {
            let f = app.formats().await?;
            emit(json, &f, |f| {
                for fmt in &f.formats {
                    let level = fmt
                        .support_level
                        .as_ref()
                        .map(|l| format!("{l:?}").to_lowercase())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<14} {:<12} {}", fmt.name, level, fmt.description);
                }
            })?;
        }
        Command::Validate { file } => {
            let v = app.validate(file).await?;
            emit(json, &v, |v| {
                println!("valid:         {}", if v.valid { "yes" } else { "no" });
                println!("format:        {}", v.format.as_deref().unwrap_or("unknown"));
                println!("lines:         {}", v.stats.line_count);
                println!("valid snps:    {}", v.stats.valid_snps);
                println!("invalid lines: {}", v.stats.invalid_lines);
                if !v.stats.chromosomes.is_empty() {
                    println!("chromosomes:   {}", v.stats.chromosomes.join(", "));
                }
                for e in &v.errors {
                    println!("  error: {e}");
                }
            })?;
        }
        Command::Upload { file } => {
            let resp = upload_with_progress(app, file).await?;
            emit(json, &resp, |r| {
                println!("file_hash: {}", r.file_hash);
                if let Some(n) = r.snp_count {
                    println!("snps:      {n}");
                }
                if let Some(f) = &r.format {
                    println!("format:    {f}");
                }
                println!("cached:    {}", r.cached);
            })?;
        }
        Command::Uploads { limit, offset } => {
            let list = app.uploads(*limit, *offset).await?;
            emit(json, &list, |l| {
                for f in &l.files {
                    println!(
                        "{}  {:>10}  {}  {}",
                        f.file_hash,
                        f.size,
                        f.created_at.as_deref().unwrap_or("-"),
                        f.filename
                    );
                }
                println!("{} file(s)", l.count);
            })?;
        }
        Command::Data { hash, rows } => {
            let data = app.snp_data(hash).await?;
            emit(json, &data, |d| {
                for s in d.snps.iter().take(*rows) {
                    println!(
                        "{:<12} {:>2} {:>10} {}{}",
                        s.rsid, s.chromosome, s.position, s.allele1, s.allele2
                    );
                }
                let total = d.snp_count.unwrap_or(d.snps.len() as u64);
                println!("showing {} of {total} snps", d.snps.len().min(*rows));
            })?;
        }
        Command::Analyze {
            hash,
            analysis_id,
            force,
        } => {
            app.select(hash.clone(), analysis_id.clone());
            let result = app.analyze(*force).await?;
            emit(json, &result, print_analysis)?;
        }
        Command::ShowResult { id } => {
            let result = app.analysis_result(id).await?;
            emit(json, &result, print_analysis)?;
        }
        Command::Exists { hash } => {
            let exists = app.analysis_exists(hash).await;
            emit(json, &serde_json::json!({ "exists": exists }), |_| {
                println!("{}", if exists { "yes" } else { "no" });
            })?;
        }
        Command::Report(cmd) => report(app, cmd, json).await?,
        Command::Run {
            file,
            report_type,
            out,
            force,
        } => {
            let uploaded = upload_with_progress(app, file).await?;
            toasts.flush();
            eprintln!("uploaded {} ({})", file.display(), uploaded.file_hash);

            let result = app.analyze(*force).await?;
            toasts.flush();
            if !json {
                print_analysis(&result);
            }

            let report = app.generate_report(*report_type).await?;
            toasts.flush();
            let download_url = app.backend.report_download_url(&report.report_id)?;

            if let Some(out) = out {
                let n = app.download_report(&report.report_id, out).await?;
                eprintln!("wrote {n} bytes to {}", out.display());
            }

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "upload": uploaded,
                        "analysis": result,
                        "report": report,
                        "download_url": download_url.as_str(),
                    }))?
                );
            } else {
                println!("report:   {}", report.report_id);
                println!("download: {download_url}");
            }
        }
        Command::Login { username, password } => {
            let password = read_password(password.as_deref())?;
            let profile = app.login(username, &password).await?;
            emit(json, &profile, print_profile)?;
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let password = read_password(password.as_deref())?;
            let profile = app
                .register(RegisterRequest {
                    username: username.clone(),
                    email: email.clone(),
                    password: password.as_str().to_owned(),
                })
                .await?;
            emit(json, &profile, print_profile)?;
        }
        Command::Me => {
            let account = app.account().await?;
            emit(json, &account, |a| match a {
                Some(Account::Api(p)) => print_profile(p),
                Some(Account::Google(g)) => {
                    println!("name:    {}", g.name);
                    println!("email:   {}", g.email);
                    println!("via:     google");
                    if let Some(t) = g.created_at {
                        println!("since:   {}", t.to_rfc3339());
                    }
                    if let Some(t) = g.expires_at {
                        println!("expires: {}", t.to_rfc3339());
                    }
                }
                None => println!("not logged in"),
            })?;
        }
        Command::UpdateProfile {
            username,
            email,
            password,
        } => {
            let profile = app
                .update_profile(ProfileUpdate {
                    username: username.clone(),
                    email: email.clone(),
                    password: password.clone(),
                })
                .await?;
            emit(json, &profile, print_profile)?;
        }
        Command::GoogleLogin { token } => {
            let user = app.google_login(token)?;
            emit(json, &user, |u| println!("signed in as {} <{}>", u.name, u.email))?;
        }
        Command::Logout => {
            app.logout()?;
            if !json {
                println!("logged out");
            }
        }
    }
    Ok(())
}

async fn report(app: &App, cmd: &ReportCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        ReportCommand::Generate {
            report_type,
            hash,
            analysis_id,
        } => {
            app.select(hash.clone(), analysis_id.clone());
            let r = app.generate_report(*report_type).await?;
            let url = app.backend.report_download_url(&r.report_id)?;
            emit(json, &r, |r| {
                println!("report:   {}", r.report_id);
                println!("cached:   {}", r.cached);
                println!("download: {url}");
            })?;
        }
        ReportCommand::Show { id } => {
            let m = app.report(id).await?;
            emit(json, &m, print_report_line)?;
        }
        ReportCommand::List => {
            let list = app.reports().await?;
            emit(json, &list, |l| {
                for m in l {
                    print_report_line(m);
                }
                println!("{} report(s)", l.len());
            })?;
        }
        ReportCommand::Download { id, out } => {
            let n = app.download_report(id, out).await?;
            if json {
                println!("{}", serde_json::json!({ "path": out, "bytes": n }));
            } else {
                println!("wrote {n} bytes to {}", out.display());
            }
        }
    }
    Ok(())
}

async fn upload_with_progress(
    app: &App,
    file: &std::path::Path,
) -> Result<zando_protocol::DnaUploadResponse, ApiError> {
    let (tx, rx) = progress_channel(0);
    let printer = tokio::spawn(print_progress(rx.clone()));
    let outcome = app.upload(file, Some(tx)).await;
    printer.abort();

    let last = *rx.borrow();
    if last.total > 0 {
        eprintln!("\r{}", progress_line(&last));
    }
    outcome
}

async fn print_progress(mut rx: watch::Receiver<UploadProgress>) {
    while rx.changed().await.is_ok() {
        let p = *rx.borrow_and_update();
        eprint!("\r{}", progress_line(&p));
        let _ = std::io::stderr().flush();
    }
}

fn progress_line(p: &UploadProgress) -> String {
    format!("uploading {:>3}% ({}/{} bytes)", p.percent(), p.sent, p.total)
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_analysis(r: &AnalysisResult) {
    println!("analysis: {}", r.analysis_id);
    if let Some(s) = &r.data.summary {
        println!("\n{s}\n");
    }

    let mut cats: Vec<_> = mutations_by_category(&r.data).into_iter().collect();
    cats.sort();
    if !cats.is_empty() {
        println!("markers by category:");
        for (cat, n) in cats {
            println!("  {cat:<20} {n}");
        }
    }

    for m in &r.data.mutations {
        println!(
            "  {:<12} {:<8} {:<3} {} [{}]",
            m.rsid, m.gene_name, m.allele, m.effect, m.evidence_level
        );
    }

    let recs = &r.data.ingredient_recommendations;
    if !recs.beneficial.is_empty() {
        println!("beneficial:");
        for i in &recs.beneficial {
            println!("  + {}: {}", i.name, i.benefit.as_deref().unwrap_or(""));
        }
    }
    if !recs.cautionary.is_empty() {
        println!("use with caution:");
        for i in &recs.cautionary {
            println!("  - {}: {}", i.name, i.caution.as_deref().unwrap_or(""));
        }
    }
}

fn print_profile(p: &UserProfile) {
    println!("id:       {}", p.id);
    println!("username: {}", p.username);
    println!("email:    {}", p.email);
    if !p.is_active {
        println!("(inactive)");
    }
}

fn print_report_line(m: &ReportMetadata) {
    let kind = m.report_type.map(ReportType::as_str).unwrap_or("-");
    println!("{}  {:<8}  {}", m.report_id, kind, m.created_at);
}

fn read_password(flag: Option<&str>) -> anyhow::Result<Zeroizing<String>> {
    if let Some(p) = flag {
        return Ok(Zeroizing::new(p.to_string()));
    }
    if let Ok(p) = std::env::var("ZANDO_PASSWORD") {
        return Ok(Zeroizing::new(p));
    }
    eprint!("password: ");
    std::io::stderr().flush()?;
    let mut line = Zeroizing::new(String::new());
    std::io::stdin().lock().read_line(&mut *line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    if trimmed.is_empty() {
        anyhow::bail!("no password given");
    }
    Ok(Zeroizing::new(trimmed))
}

/// Renders toasts on stderr in the order they were shown.
struct ToastPrinter {
    rx: broadcast::Receiver<NotificationEvent>,
}

impl ToastPrinter {
    fn new(rx: broadcast::Receiver<NotificationEvent>) -> Self {
        Self { rx }
    }

    fn flush(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(NotificationEvent::Shown(n)) => {
                    let tag = match n.severity {
                        Severity::Success => "ok",
                        Severity::Error => "error",
                        Severity::Info => "info",
                        Severity::Warning => "warn",
                    };
                    match n.detail {
                        Some(d) => eprintln!("[{tag}] {}: {d}", n.message),
                        None => eprintln!("[{tag}] {}", n.message),
                    }
                }
                Ok(NotificationEvent::Dismissed(_)) => {}
                Err(TryRecvError::Lagged(n)) => eprintln!("[warn] {n} notification(s) dropped"),
                Err(_) => break,
            }
        }
    }
}
