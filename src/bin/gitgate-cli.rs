use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::path::PathBuf;
use std::process::ExitCode;

use gitgate::cache::sha256_hex;
use gitgate::signing::verify_with_pem;

#[derive(Parser)]
#[command(name = "gitgate-cli")]
#[command(about = "Client tools for a GitGate gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 of a file
    Checksum { file: PathBuf },
    /// Check a detached RSA-SHA256 signature
    Verify {
        /// File whose bytes were signed
        file: PathBuf,
        /// Base64 signature as sent in X-Signature-RSA-SHA256
        #[arg(short, long)]
        signature: String,
        /// PEM public key (SPKI or PKCS#1)
        #[arg(short = 'k', long)]
        public_key: PathBuf,
    },
    /// Download an asset through the gateway and check its integrity headers
    Fetch {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        owner: String,
        repo: String,
        version: String,
        asset: String,
        /// Extra request header as NAME=VALUE, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Write the asset here
        #[arg(short, long)]
        output: PathBuf,
        /// Require a valid signature under this PEM public key
        #[arg(short = 'k', long)]
        public_key: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Checksum { file } => {
            let data = std::fs::read(&file)?;
            println!("{}  {}", sha256_hex(&data), file.display());
            Ok(true)
        }
        Commands::Verify {
            file,
            signature,
            public_key,
        } => {
            let data = std::fs::read(&file)?;
            let pem = std::fs::read_to_string(&public_key)?;
            let valid = verify_with_pem(&pem, &data, &signature);
            println!("{}", if valid { "signature OK" } else { "signature INVALID" });
            Ok(valid)
        }
        Commands::Fetch {
            url,
            owner,
            repo,
            version,
            asset,
            headers,
            output,
            public_key,
        } => {
            let mut header_map = HeaderMap::new();
            for raw in &headers {
                let (name, value) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("header '{}' is not NAME=VALUE", raw))?;
                header_map.insert(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }

            let target = format!(
                "{}/release/{}/{}/{}/{}",
                url.trim_end_matches('/'),
                urlencoding::encode(&owner),
                urlencoding::encode(&repo),
                urlencoding::encode(&version),
                urlencoding::encode(&asset),
            );
            let res = reqwest::Client::new()
                .get(&target)
                .headers(header_map)
                .send()
                .await?;

            let status = res.status();
            if let Some(remaining) = res.headers().get("x-ratelimit-remaining") {
                println!("Rate limit remaining: {}", remaining.to_str().unwrap_or("?"));
            }
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                println!("Status: {}", status);
                println!("{}", body);
                return Ok(false);
            }

            let expected = header(&res, "x-checksum-sha256");
            let signature = header(&res, "x-signature-rsa-sha256");
            let data = res.bytes().await?;

            let actual = sha256_hex(&data);
            match expected.as_deref() {
                Some(expected) if expected.eq_ignore_ascii_case(&actual) => {
                    println!("Checksum OK: {}", actual);
                }
                Some(expected) => {
                    println!("Checksum MISMATCH: expected {}, got {}", expected, actual);
                    return Ok(false);
                }
                None => println!("No checksum header; computed {}", actual),
            }

            if let Some(path) = public_key {
                let pem = std::fs::read_to_string(&path)?;
                let Some(signature) = signature else {
                    println!("No signature header");
                    return Ok(false);
                };
                if !verify_with_pem(&pem, &data, &signature) {
                    println!("signature INVALID");
                    return Ok(false);
                }
                println!("signature OK");
            }

            std::fs::write(&output, &data)?;
            println!("Wrote {} bytes to {}", data.len(), output.display());
            Ok(true)
        }
    }
}

fn header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
