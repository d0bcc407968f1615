use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    // Already initialized is fine (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn format_number(num: u64) -> String {
    let digits = num.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn redact_host(host: &str) -> String {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => (name, Some(port)),
        _ => (host, None),
    };

    let parts: Vec<&str> = name.split('.').collect();
    let redacted = if parts.len() <= 1 {
        name.to_string()
    } else if parts[parts.len() - 2].len() <= 3 {
        format!("???.{}", parts[parts.len() - 1])
    } else {
        let mut masked: Vec<String> = parts[..parts.len() - 1]
            .iter()
            .map(|part| "*".repeat(part.len()))
            .collect();
        masked.push(parts[parts.len() - 1].to_string());
        masked.join(".")
    };

    match port {
        Some(port) => format!("{}:{}", redacted, port),
        None => redacted,
    }
}

pub fn validate_args(args: &crate::args::Args) -> anyhow::Result<()> {
    if let Some(top) = args.top {
        if top == 0 {
            anyhow::bail!("--top must be greater than 0");
        }
    }

    if args.files.is_empty() {
        anyhow::bail!("at least one WARC file is required");
    }

    Ok(())
}
