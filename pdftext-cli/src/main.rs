use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdftext::{extract_text_with_options, ExtractionOptions, PdfDocument};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdftext",
    about = "Extract text from PDF files",
    version,
    author
)]
struct Cli {
    /// Log parsing details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a PDF file
    ExtractText {
        /// Input PDF file
        input: PathBuf,

        /// Output text file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page number to extract (1-based, extracts all if not specified)
        #[arg(short = 'p', long)]
        page: Option<usize>,

        /// Print the full extraction result as JSON
        #[arg(long)]
        json: bool,

        /// Interpret pages on worker threads
        #[arg(long)]
        parallel: bool,

        /// Page marker template; {page} is replaced by the page number
        #[arg(long, value_name = "TEMPLATE")]
        marker: Option<String>,
    },

    /// Get information about a PDF file
    Info {
        /// Input PDF file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::ExtractText {
            input,
            output,
            page,
            json,
            parallel,
            marker,
        } => {
            let mut options = ExtractionOptions::default().with_parallel(parallel);
            if let Some(marker) = marker {
                options = options.with_page_marker(marker);
            }
            let data = read_input(&input)?;

            let rendered = match page {
                Some(page) => extract_page(&data, page, &options, json)?,
                None => {
                    let result = extract_text_with_options(&data, &options);
                    if !result.success {
                        bail!(
                            "Failed to extract text from {}: {}",
                            input.display(),
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    for skipped in &result.skipped_pages {
                        eprintln!("Warning: page {} skipped: {}", skipped.index + 1, skipped.error);
                    }
                    if json {
                        serde_json::to_string_pretty(&result)?
                    } else {
                        result.text
                    }
                }
            };

            match output {
                Some(path) => {
                    fs::write(&path, rendered.as_bytes())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✓ Text written to: {}", path.display());
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Info { input } => {
            let data = read_input(&input)?;
            let document = PdfDocument::parse(&data, &ExtractionOptions::default())
                .with_context(|| format!("Failed to open PDF: {}", input.display()))?;
            let reader = document.reader();

            println!("PDF Information for: {}", input.display());
            println!("==========================================");
            match reader.version() {
                Some(version) => println!("PDF Version: {}", version),
                None => println!("PDF Version: unknown"),
            }
            println!("Pages: {}", document.page_count());

            if document.page_count() > 0 {
                println!("\nPage Information:");
                println!("-----------------");
            }
            for index in 0..document.page_count() {
                match document.page_at(index) {
                    Ok(page) => {
                        let [llx, lly, urx, ury] = page.media_box;
                        println!(
                            "Page {}: {:.0}x{:.0} pts, MediaBox [{} {} {} {}], rotation {}",
                            index + 1,
                            page.width(),
                            page.height(),
                            llx,
                            lly,
                            urx,
                            ury,
                            page.rotation
                        );
                    }
                    Err(e) => println!("Page {}: [Could not read: {}]", index + 1, e),
                }
            }

            // Page lookups may locate objects by scanning, so report last
            println!(
                "\nRecovered: {}",
                if reader.was_recovered() { "yes" } else { "no" }
            );
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pdftext=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdftext=warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    tracing::debug!("read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

fn extract_page(data: &[u8], page: usize, options: &ExtractionOptions, json: bool) -> Result<String> {
    let document = PdfDocument::parse(data, options).context("Failed to open PDF")?;
    if page == 0 || page > document.page_count() {
        bail!(
            "Page {} out of range (document has {} pages)",
            page,
            document.page_count()
        );
    }
    let text = document
        .page_text(page - 1)
        .with_context(|| format!("Failed to extract text from page {}", page))?;

    if json {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "page": page,
            "text": text,
        }))?)
    } else {
        Ok(text)
    }
}
