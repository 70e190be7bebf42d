use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use subpipe_core::SubtitleFormat;
use subpipe_local::LocalSetup;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod envelope;
#[cfg(feature = "stdio")]
mod mcp;
mod ops;
mod serve;

#[derive(Parser, Debug)]
#[command(name = "subpipe")]
#[command(about = "Subtitle text for media URLs via yt-dlp (CLI, HTTP, MCP stdio)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the best subtitle track for a URL and print it as plain text (json by default).
    Subs(SubsCmd),
    /// List subtitle languages and the order they would be tried (no download).
    Languages(LanguagesCmd),
    /// Normalize a local SRT/WebVTT file to plain text.
    Normalize(NormalizeCmd),
    /// Serve `POST /download_subs` over HTTP.
    Serve(ServeCmd),
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct SubsCmd {
    /// Media page URL.
    url: String,
    /// Preferred subtitle language (default: SUBPIPE_DEFAULT_LANG).
    #[arg(long, alias = "language")]
    lang: Option<String>,
    /// Never fall back past the detected/requested language.
    #[arg(long)]
    strict: bool,
    /// Drop consecutive duplicate caption lines; `--dedupe=false` overrides SUBPIPE_DEDUPE.
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    dedupe: Option<bool>,
    /// Max transcript chars (default: SUBPIPE_MAX_CHARS).
    #[arg(long)]
    max_chars: Option<usize>,
    /// Output format: json|text
    #[arg(long = "output", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct LanguagesCmd {
    /// Media page URL.
    url: String,
    #[arg(long, alias = "language")]
    lang: Option<String>,
    #[arg(long)]
    strict: bool,
    /// Output format: json|text
    #[arg(long = "output", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct NormalizeCmd {
    /// Subtitle file path.
    path: PathBuf,
    /// srt|vtt (default: inferred from the file extension).
    #[arg(long)]
    format: Option<SubtitleFormat>,
    #[arg(long)]
    dedupe: bool,
    /// Output format: json|text
    #[arg(long = "output", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Listen address.
    #[arg(long, env = "SUBPIPE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Attempt a local stdio MCP handshake (list_tools) to prove an MCP client can start the server.
    ///
    /// Spawns a child `subpipe mcp-stdio` process and calls `list_tools`; no media is fetched.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake and the `yt-dlp --version` check (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Optional env-file loader (opt-in via SUBPIPE_ENV_FILE).
///
/// MCP server environments often aren't interactive shells. Sets vars only if not already set
/// in the process environment, and never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("SUBPIPE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        // Don't override explicit process env.
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

/// Logs go to stderr only: stdout carries JSON output and the MCP stdio transport.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

/// Print a reply; failures still print their JSON envelope, then exit nonzero.
fn emit(r: ops::Reply, output: &str, text: impl Fn(&serde_json::Value) -> String) -> Result<()> {
    let text_mode = output.eq_ignore_ascii_case("text");
    match r {
        Ok(v) => {
            if text_mode {
                println!("{}", text(&v));
            } else {
                println!("{v}");
            }
            Ok(())
        }
        Err(f) => {
            if !text_mode {
                println!("{}", f.payload);
            }
            anyhow::bail!(
                "{}: {}",
                f.code.as_str(),
                f.payload["error"]["message"].as_str().unwrap_or("")
            )
        }
    }
}

fn languages_text(v: &serde_json::Value) -> String {
    let join = |key: &str, field: Option<&str>| -> String {
        v[key]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|x| match field {
                        Some(f) => x[f].as_str(),
                        None => x.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    };
    format!(
        "available: {}\ncandidates: {}",
        join("available", None),
        join("candidates", Some("code"))
    )
}

fn handshake_error(code: &str, message: impl ToString, hint: &str) -> serde_json::Value {
    serde_json::json!({ "code": code, "message": message.to_string(), "hint": hint })
}

/// Start `subpipe mcp-stdio` as a child and list its tools.
///
/// Spawn, initialize and `list_tools` share one deadline, and every failure comes back as an
/// error object for the doctor report.
#[cfg(feature = "stdio")]
async fn stdio_handshake(
    deadline: std::time::Duration,
) -> std::result::Result<usize, serde_json::Value> {
    use rmcp::service::ServiceExt;
    use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};

    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("subpipe"));
    let attempt = async move {
        let child = TokioChildProcess::new(tokio::process::Command::new(exe).configure(|cmd| {
            cmd.arg("mcp-stdio");
            cmd.env("RUST_LOG", "error");
        }))
        .map_err(|e| {
            handshake_error(
                "spawn_failed",
                e,
                "Could not start `subpipe mcp-stdio`; check the binary path and permissions.",
            )
        })?;
        let client = ().serve(child).await.map_err(|e| {
            handshake_error(
                "initialize_failed",
                e,
                "The child exited or wrote non-protocol output to stdout during initialize.",
            )
        })?;
        let listed = client.list_tools(Default::default()).await;
        let _ = client.cancel().await;
        listed.map(|t| t.tools.len()).map_err(|e| {
            handshake_error(
                "list_tools_failed",
                e,
                "The server initialized but `list_tools` failed; check stderr with RUST_LOG=debug.",
            )
        })
    };
    match tokio::time::timeout(deadline, attempt).await {
        Ok(r) => r,
        Err(_) => Err(handshake_error(
            "timeout",
            format!("stdio handshake timed out after {}ms", deadline.as_millis()),
            "The child did not finish initialize and list_tools in time; check for a stuck startup.",
        )),
    }
}

async fn doctor(args: DoctorCmd, setup: &LocalSetup) -> Result<()> {
    let t0 = std::time::Instant::now();
    let cfg = setup.ytdlp.config();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    // Check: yt-dlp is installed and runs.
    let ytdlp_path = subpipe_local::shellout::which(&cfg.bin);
    let mut ytdlp_version: Option<String> = None;
    let mut ytdlp_error: Option<&'static str> = None;
    if ytdlp_path.is_some() {
        let mut cmd = tokio::process::Command::new(&cfg.bin);
        cmd.arg("--version");
        match subpipe_local::shellout::run_bounded(
            cmd,
            std::time::Duration::from_millis(args.timeout_ms.max(50)),
            4096,
        )
        .await
        {
            Ok(out) => {
                ytdlp_version = Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            Err(e) => ytdlp_error = Some(e.code),
        }
    }
    let ytdlp_ok = ytdlp_path.is_some() && ytdlp_error.is_none();
    checks.push(serde_json::json!({
        "name": "ytdlp",
        "ok": ytdlp_ok,
        "message": if ytdlp_path.is_none() {
            "yt-dlp not found"
        } else if ytdlp_ok {
            "yt-dlp runs"
        } else {
            "yt-dlp found but `--version` failed"
        },
        "hint": if ytdlp_ok { "" } else { "Install yt-dlp (e.g. `pipx install yt-dlp`) or set SUBPIPE_YTDLP_BIN to its path." },
        "path": ytdlp_path.map(|p| p.to_string_lossy().to_string()),
        "version": ytdlp_version,
        "error": ytdlp_error,
    }));

    // Check: stdio MCP handshake (optional).
    let stdio_t0 = std::time::Instant::now();
    let stdio: Option<std::result::Result<usize, serde_json::Value>> = if !args.check_stdio {
        None
    } else {
        #[cfg(feature = "stdio")]
        let r = stdio_handshake(std::time::Duration::from_millis(args.timeout_ms.max(50))).await;
        #[cfg(not(feature = "stdio"))]
        let r = Err(handshake_error(
            "feature_disabled",
            "built without feature `stdio`",
            "`mcp-stdio` requires building with feature `stdio`.",
        ));
        Some(r)
    };
    let stdio_ok = match &stdio {
        None => true,
        Some(r) => r.is_ok(),
    };
    checks.push(serde_json::json!({
        "name": "mcp_stdio_handshake",
        "ok": stdio_ok,
        "skipped": stdio.is_none(),
        "message": match &stdio {
            None => "stdio MCP handshake skipped",
            Some(Ok(_)) => "stdio MCP handshake succeeded",
            Some(Err(_)) => "stdio MCP handshake failed",
        },
        "hint": if stdio_ok {
            ""
        } else {
            "Check that the MCP client points at the correct `subpipe` binary with args [\"mcp-stdio\"]."
        },
        "tool_count": stdio.as_ref().and_then(|r| r.as_ref().ok().copied()),
        "elapsed_ms": stdio.as_ref().map(|_| stdio_t0.elapsed().as_millis()),
        "error": stdio.as_ref().and_then(|r| r.as_ref().err().cloned()),
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let payload = serde_json::json!({
        "schema_version": envelope::SCHEMA_VERSION,
        "kind": "doctor",
        "ok": ok,
        "name": "subpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "features": {
            "stdio": cfg!(feature = "stdio"),
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "ytdlp_bin": cfg.bin,
            "ytdlp_timeout_ms": cfg.timeout.as_millis() as u64,
            "sub_format": cfg.sub_format,
            "convert_srt": cfg.convert_srt,
            "max_chars": setup.max_chars,
            "default_lang": setup.default_lang,
            "dedupe": setup.dedupe,
            "fallback": setup.policy.fallback,
            "orig_variants": setup.policy.orig_variants,
        },
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("subpipe {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            println!("ytdlp_bin: {}", cfg.bin);
            println!("checks:");
            if let Some(arr) = payload["checks"].as_array() {
                for c in arr {
                    let name = c["name"].as_str().unwrap_or("?");
                    let ok = c["ok"].as_bool().unwrap_or(false);
                    if c["skipped"].as_bool().unwrap_or(false) {
                        println!("- {}: skipped", name);
                    } else {
                        println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                    }
                }
            }
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_logging();

    let cli = Cli::parse();
    let setup = LocalSetup::from_env();

    match cli.command {
        Commands::Subs(args) => {
            let p = ops::SubsParams {
                url: args.url,
                lang: args.lang,
                strict: args.strict,
                dedupe: args.dedupe,
                max_chars: args.max_chars,
            };
            emit(ops::subtitle_text(&setup, p).await, &args.output, |v| {
                v["content"].as_str().unwrap_or("").to_string()
            })?;
        }
        Commands::Languages(args) => {
            let r = ops::subtitle_languages(&setup, &args.url, args.lang, args.strict).await;
            emit(r, &args.output, languages_text)?;
        }
        Commands::Normalize(args) => {
            let r = ops::normalize_file(&args.path, args.format, args.dedupe);
            emit(r, &args.output, |v| {
                v["content"].as_str().unwrap_or("").to_string()
            })?;
        }
        Commands::Serve(args) => {
            serve::serve_http(args.bind, setup).await?;
        }
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio(setup)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Doctor(args) => {
            doctor(args, &setup).await?;
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": envelope::SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "subpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("subpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
