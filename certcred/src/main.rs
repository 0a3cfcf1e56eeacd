//! certcred: Command-line front end for certcred-lib.

use anyhow::{Context, Result};
use certcred_lib::selector::certificate_key_exchanges;
use certcred_lib::{
    format_timestamp, now_timestamp, try_peer_activation_time, try_peer_expiration_time,
    verify_peers, CertStatus, Certificate, CertificateCredentials, CertificateFormat, ConvFlags,
    CredentialsConfig, DigestAlgorithm, FlagLabels, KxAlgorithm, Role, Session, VerifyFlags,
};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "certcred",
    about = "Inspect certificates and verify peer chains the way a TLS handshake does",
    long_about = "certcred normalizes X.509 certificates, lists the key exchanges a\n\
                  certificate can authenticate, and verifies certificate chains\n\
                  against a credential store of trusted CAs and CRLs.\n\n\
                  Input format (PEM vs DER) is auto-detected unless --pem or --der\n\
                  is specified. All commands read from stdin when no file is given.\n\
                  Set RUST_LOG=debug for a trace of the checks performed.",
    after_help = "EXAMPLES:\n\
                  \n  certcred inspect cert.pem\
                  \n  certcred inspect --json --digest sha384 chain.pem\
                  \n  certcred kx server.pem\
                  \n  certcred verify --CAfile ca.pem chain.pem\
                  \n  certcred verify --config creds.json certs/\
                  \n  certcred times --within 30d cert.pem"
)]
struct Cli {
    /// More log output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct InputArgs {
    /// Certificate file (PEM or DER). Reads from stdin if omitted.
    file: Option<PathBuf>,
    /// Force DER input parsing (default: auto-detect)
    #[arg(long, conflicts_with = "pem")]
    der: bool,
    /// Force PEM input parsing (default: auto-detect)
    #[arg(long)]
    pem: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the normalized form of each certificate in the input
    #[command(after_help = "EXAMPLES:\n\
                      \n  certcred inspect cert.pem\
                      \n  certcred inspect --only-extensions cert.der\
                      \n  certcred inspect --json chain.pem")]
    Inspect {
        #[command(flatten)]
        input: InputArgs,
        /// Hash algorithm for the fingerprint
        #[arg(long, value_enum, default_value = "sha256")]
        digest: DigestArg,
        /// Extract key usage and version only
        #[arg(long, conflicts_with = "only_pubkey")]
        only_extensions: bool,
        /// Extract the public key only
        #[arg(long)]
        only_pubkey: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the key exchange algorithms the leaf certificate can authenticate
    Kx {
        #[command(flatten)]
        input: InputArgs,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Verify a peer chain against trusted CAs (exit 0 = trusted, 2 = not)
    #[command(
        after_help = "FILE holds the peer's chain, leaf first. Without --CAfile, --CApath\n\
                      or --config the system trust store is used.\n\
                      \nFLAGS (--flag, repeatable):\n\
                      \n  disable-ca-sign           Do not require issuers to be CAs\
                      \n  allow-x509-v1-ca-crt      Accept v1 trusted CA certificates\
                      \n  allow-any-x509-v1-ca-crt  Accept v1 intermediates too\
                      \n  do-not-allow-same         A trusted peer certificate is not enough\
                      \n  allow-sign-rsa-md2        Accept MD2 signatures\
                      \n  allow-sign-rsa-md5        Accept MD5 signatures\
                      \n  disable-time-checks       Skip validity period checks\
                      \n  disable-crl-checks        Skip revocation checks\
                      \n\nEXAMPLES:\n\
                      \n  certcred verify chain.pem\
                      \n  certcred verify --CAfile ca.pem --CRLfile ca.crl chain.pem\
                      \n  certcred verify --flag disable-time-checks --json chain.pem\
                      \n  certcred verify --config creds.json -r certs/"
    )]
    Verify {
        /// PEM/DER chain file or a directory of them. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// JSON credential configuration
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// PEM file containing trusted CA certificates
        #[arg(long = "CAfile", visible_alias = "ca-file", value_name = "FILE")]
        ca_file: Option<PathBuf>,
        /// Directory of trusted CA certificates in PEM format
        #[arg(long = "CApath", visible_alias = "ca-path", value_name = "DIR")]
        ca_path: Option<PathBuf>,
        /// Also trust the system CA store
        #[arg(long)]
        system: bool,
        /// PEM file containing CRL(s) for revocation checking
        #[arg(long = "CRLfile", visible_alias = "crl-file", value_name = "FILE")]
        crl_file: Option<PathBuf>,
        /// Verification flag by name (see FLAGS)
        #[arg(long = "flag", value_name = "NAME")]
        flags: Vec<String>,
        /// Maximum chain length
        #[arg(long, value_name = "N")]
        verify_depth: Option<usize>,
        /// Maximum public key size in bits
        #[arg(long, value_name = "BITS")]
        max_bits: Option<u32>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Only print failures (directory mode)
        #[arg(long)]
        failures_only: bool,
        /// Recurse into subdirectories (directory mode)
        #[arg(short, long)]
        recurse: bool,
    },
    /// Print the validity period of the leaf certificate
    #[command(after_help = "DURATION FORMAT:\n\
                      \n  Plain numbers are treated as seconds. You can also use humantime\
                      \n  notation: s, m/min, h/hr, d/day, w/week, month, y/year.\
                      \n\nEXAMPLES:\n\
                      \n  certcred times cert.pem\
                      \n  certcred times --within 30d cert.pem   # exit 1 if expiring sooner")]
    Times {
        #[command(flatten)]
        input: InputArgs,
        /// Exit 1 when the certificate expires within DURATION
        #[arg(long, value_name = "DURATION")]
        within: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum DigestArg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl From<DigestArg> for DigestAlgorithm {
    fn from(arg: DigestArg) -> Self {
        match arg {
            DigestArg::Sha1 => DigestAlgorithm::Sha1,
            DigestArg::Sha256 => DigestAlgorithm::Sha256,
            DigestArg::Sha384 => DigestAlgorithm::Sha384,
            DigestArg::Sha512 => DigestAlgorithm::Sha512,
        }
    }
}

/// Maximum file size for certificate inputs (10 MiB).
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn input_format(input: &[u8], der: bool, pem: bool) -> CertificateFormat {
    if der {
        CertificateFormat::Der
    } else if pem {
        CertificateFormat::Pem
    } else {
        CertificateFormat::detect(input)
    }
}

/// Read the input and split it into DER certificates, leaf first.
fn read_chain(args: &InputArgs) -> Result<Vec<Vec<u8>>> {
    let input = read_input(args.file.as_ref())?;
    let format = input_format(&input, args.der, args.pem);
    Ok(certcred_lib::x509::split_certificates(&input, format)?)
}

fn input_label(file: Option<&PathBuf>) -> String {
    file.map_or("stdin".to_string(), |f| f.display().to_string())
}

/// Parse a duration string using humantime format.
///
/// Plain numbers (e.g. "3600") default to seconds. Otherwise, standard
/// humantime units are accepted: `s`, `m`, `h`, `d`, `w`, `months`, `y`, etc.
fn parse_duration(s: &str) -> Result<Duration> {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = s.parse().context("Invalid duration value")?;
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))
}

/// Combine verification flag names.
fn parse_flags(names: &[String]) -> Result<VerifyFlags> {
    names.iter().try_fold(VerifyFlags::empty(), |acc, name| {
        VerifyFlags::from_label(name)
            .map(|flag| acc | flag)
            .with_context(|| format!("Unknown verification flag: '{name}'"))
    })
}

/// Check if a path has a certificate file extension.
fn is_cert_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("der")
            || ext.eq_ignore_ascii_case("crt") || ext.eq_ignore_ascii_case("cer")
    )
}

/// Find all certificate files (.pem, .der, .crt, .cer) in a directory.
fn find_cert_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let walker = if recurse {
        walkdir::WalkDir::new(dir)
    } else {
        walkdir::WalkDir::new(dir).max_depth(1)
    };
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_cert_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[derive(Serialize)]
struct InspectReport {
    index: usize,
    cert_type: String,
    version: Option<u32>,
    pk_algorithm: String,
    key_bits: Option<u32>,
    params: Vec<String>,
    key_usage: Option<Vec<String>>,
    fingerprint: Option<String>,
}

impl InspectReport {
    fn new(index: usize, cert: &Certificate, digest: DigestAlgorithm) -> Self {
        InspectReport {
            index,
            cert_type: cert.cert_type().to_string(),
            version: cert.version(),
            pk_algorithm: cert.pk_algorithm().to_string(),
            key_bits: cert.key_bits(),
            params: cert.params().iter().map(|p| p.to_hex()).collect(),
            key_usage: cert.key_usage().map(|ku| ku.labels()),
            fingerprint: cert.fingerprint(digest),
        }
    }

    fn print_text(&self, digest: DigestArg) {
        println!("Certificate {}:", self.index);
        println!("    Type: {}", self.cert_type);
        if let Some(version) = self.version {
            println!("    Version: {}", version);
        }
        print!("    Public Key: {}", self.pk_algorithm);
        if let Some(bits) = self.key_bits {
            print!(" ({} bit, {} parameters)", bits, self.params.len());
        }
        println!();
        match &self.key_usage {
            Some(names) if !names.is_empty() => println!("    Key Usage: {}", names.join(", ")),
            Some(_) => println!("    Key Usage: (empty)"),
            None => {}
        }
        if let Some(fp) = &self.fingerprint {
            println!("    Fingerprint ({:?}): {}", digest, fp);
        }
    }
}

#[derive(Serialize)]
struct VerifyReport {
    path: String,
    trusted: bool,
    status: Option<CertStatus>,
    reasons: Vec<String>,
    not_before: Option<String>,
    not_after: Option<String>,
    error: Option<String>,
}

impl VerifyReport {
    fn detail(&self) -> String {
        match (&self.error, self.status) {
            (Some(e), _) => format!("FAIL ({})", e),
            (None, Some(status)) if status.is_trusted() => "OK".to_string(),
            (None, Some(status)) => format!("FAIL ({})", status),
            (None, None) => "FAIL".to_string(),
        }
    }
}

/// Verify one peer chain through a client session over `creds`.
fn verify_one(
    label: String,
    chain: Vec<Vec<u8>>,
    creds: &Arc<CertificateCredentials>,
) -> VerifyReport {
    let mut session = Session::with_credentials(Role::Client, Arc::clone(creds));
    let mut report = VerifyReport {
        path: label,
        trusted: false,
        status: None,
        reasons: Vec::new(),
        not_before: None,
        not_after: None,
        error: None,
    };
    if let Err(e) = session.receive_peer_certificates(chain) {
        report.error = Some(e.to_string());
        return report;
    }
    match verify_peers(&mut session) {
        Ok(status) => {
            report.trusted = status.is_trusted();
            report.reasons = status.labels();
            report.status = Some(status);
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report.not_before = try_peer_activation_time(&session).ok().map(format_timestamp);
    report.not_after = try_peer_expiration_time(&session).ok().map(format_timestamp);
    report
}

fn verify_file(path: &Path, creds: &Arc<CertificateCredentials>) -> VerifyReport {
    let label = path.display().to_string();
    let chain = std::fs::read(path)
        .map_err(anyhow::Error::from)
        .and_then(|data| {
            let format = CertificateFormat::detect(&data);
            Ok(certcred_lib::x509::split_certificates(&data, format)?)
        });
    match chain {
        Ok(chain) => verify_one(label, chain, creds),
        Err(e) => VerifyReport {
            path: label,
            trusted: false,
            status: None,
            reasons: Vec::new(),
            not_before: None,
            not_after: None,
            error: Some(e.to_string()),
        },
    }
}

struct TrustArgs<'a> {
    config: Option<&'a PathBuf>,
    ca_file: Option<&'a PathBuf>,
    ca_path: Option<&'a PathBuf>,
    system: bool,
    crl_file: Option<&'a PathBuf>,
    flags: &'a [String],
    verify_depth: Option<usize>,
    max_bits: Option<u32>,
}

fn build_credentials(args: &TrustArgs<'_>) -> Result<CertificateCredentials> {
    let mut creds = match args.config {
        Some(path) => {
            let config = CredentialsConfig::from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?;
            CertificateCredentials::from_config(&config)?
        }
        None => CertificateCredentials::new(),
    };

    if let Some(path) = args.ca_file {
        creds
            .add_trust_file(path, CertificateFormat::Pem)
            .with_context(|| format!("Failed to load CA file: {}", path.display()))?;
    }
    if let Some(dir) = args.ca_path {
        creds
            .add_trust_dir(dir)
            .with_context(|| format!("Failed to load CA directory: {}", dir.display()))?;
    }
    let explicit_trust = args.config.is_some() || args.ca_file.is_some() || args.ca_path.is_some();
    if args.system || !explicit_trust {
        let added = creds.add_system_trust().context("Failed to load system trust store")?;
        log::info!("loaded {} system CA certificates", added);
    }
    if let Some(path) = args.crl_file {
        creds
            .add_crl_file(path, CertificateFormat::Pem)
            .with_context(|| format!("Failed to load CRL file: {}", path.display()))?;
    }

    let flags = creds.verify_policy().flags | parse_flags(args.flags)?;
    creds.set_verify_flags(flags);
    let policy = *creds.verify_policy();
    creds.set_verify_limits(
        args.max_bits.unwrap_or(policy.max_bits),
        args.verify_depth.unwrap_or(policy.max_depth),
    );
    log::debug!("credentials: {:?}", creds);
    Ok(creds)
}

fn print_verify_report(report: &VerifyReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if report.trusted {
        println!("{}: {}", report.path, report.detail());
    } else {
        eprintln!("{}: {}", report.path, report.detail());
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Normalize the leaf of `chain` and list the key exchanges it can authenticate.
fn leaf_key_exchanges(chain: &[Vec<u8>]) -> Result<(Certificate, Vec<KxAlgorithm>)> {
    let leaf_der = chain.first().context("No certificate in input")?;
    let leaf = Certificate::normalize(leaf_der, CertificateFormat::Der, ConvFlags::NO_COPY)
        .context("Leaf certificate could not be normalized")?;
    let algorithms = certificate_key_exchanges(&leaf);
    Ok((leaf, algorithms))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Inspect {
            input,
            digest,
            only_extensions,
            only_pubkey,
            json,
        } => {
            let mut flags = ConvFlags::empty();
            if *only_extensions {
                flags.insert(ConvFlags::ONLY_EXTENSIONS);
            }
            if *only_pubkey {
                flags.insert(ConvFlags::ONLY_PUBKEY);
            }
            let reports = read_chain(input)?
                .iter()
                .enumerate()
                .map(|(i, der)| {
                    let cert = Certificate::normalize(der, CertificateFormat::Der, flags)
                        .with_context(|| format!("Certificate {} could not be normalized", i))?;
                    Ok(InspectReport::new(i, &cert, (*digest).into()))
                })
                .collect::<Result<Vec<_>>>()?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    report.print_text(*digest);
                }
            }
        }
        Commands::Kx { input, json } => {
            let chain = read_chain(input)?;
            let (leaf, algorithms) = leaf_key_exchanges(&chain)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&algorithms)?);
            } else if algorithms.is_empty() {
                eprintln!(
                    "{} certificate permits no key exchange",
                    leaf.pk_algorithm()
                );
            } else {
                for kx in &algorithms {
                    println!("{}", kx);
                }
            }
            if algorithms.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Verify {
            file,
            config,
            ca_file,
            ca_path,
            system,
            crl_file,
            flags,
            verify_depth,
            max_bits,
            json,
            failures_only,
            recurse,
        } => {
            let creds = Arc::new(build_credentials(&TrustArgs {
                config: config.as_ref(),
                ca_file: ca_file.as_ref(),
                ca_path: ca_path.as_ref(),
                system: *system,
                crl_file: crl_file.as_ref(),
                flags,
                verify_depth: *verify_depth,
                max_bits: *max_bits,
            })?);

            // Directory mode: verify all cert files in parallel
            if let Some(path) = file {
                if path.is_dir() {
                    let files = find_cert_files(path, *recurse);
                    if files.is_empty() {
                        anyhow::bail!(
                            "No certificate files (.pem, .der, .crt, .cer) found in {}",
                            path.display()
                        );
                    }
                    let reports: Vec<VerifyReport> =
                        files.par_iter().map(|f| verify_file(f, &creds)).collect();
                    let failures = reports.iter().filter(|r| !r.trusted).count();
                    if *json {
                        println!("{}", serde_json::to_string_pretty(&reports)?);
                    } else {
                        for report in reports.iter().filter(|r| !*failures_only || !r.trusted) {
                            print_verify_report(report, false)?;
                        }
                    }
                    if failures > 0 {
                        std::process::exit(2);
                    }
                    return Ok(());
                }
            }

            // Single file mode
            let input = read_input(file.as_ref())?;
            let format = CertificateFormat::detect(&input);
            let chain = certcred_lib::x509::split_certificates(&input, format)?;
            let report = verify_one(input_label(file.as_ref()), chain, &creds);
            print_verify_report(&report, *json)?;
            if !report.trusted {
                std::process::exit(2);
            }
        }
        Commands::Times {
            input,
            within,
            json,
        } => {
            let chain = read_chain(input)?;
            let mut session =
                Session::with_credentials(Role::Client, Arc::new(CertificateCredentials::new()));
            session.receive_peer_certificates(chain)?;
            let not_before = try_peer_activation_time(&session)?;
            let not_after = try_peer_expiration_time(&session)?;

            if *json {
                let value = serde_json::json!({
                    "not_before": format_timestamp(not_before),
                    "not_after": format_timestamp(not_after),
                    "not_before_unix": not_before,
                    "not_after_unix": not_after,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Not Before: {}", format_timestamp(not_before));
                println!("Not After:  {}", format_timestamp(not_after));
            }

            if let Some(within) = within {
                let window = parse_duration(within)?;
                let deadline = now_timestamp().saturating_add(window.as_secs() as i64);
                if not_after < deadline {
                    eprintln!(
                        "{}: expires within {}",
                        input_label(input.file.as_ref()),
                        humantime::format_duration(window)
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
