use clap::Parser;
use laser_layers::{LayerPipeline, ProcessOptions, load_image_file};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "laser-layers")]
#[command(about = "Split a photo into stacked single-color layers for laser-cut acrylic")]
struct Cli {
    /// Input image (PNG or JPEG)
    input: PathBuf,

    /// Output directory for layer PNGs, preview and manifest
    #[arg(short, long)]
    output: PathBuf,

    /// Number of colors / layers (2-12)
    #[arg(short = 'k', long = "colors")]
    colors: Option<usize>,

    /// Regions smaller than this many pixels merge into a neighbor
    #[arg(long)]
    min_region_size: Option<usize>,

    /// Denoise radius in pixels; 1 or less disables cleaning
    #[arg(long)]
    min_feature_size: Option<usize>,

    /// JSON options file; explicit flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> Result<ProcessOptions, laser_layers::LayerError> {
        let mut options = match &self.config {
            Some(path) => ProcessOptions::from_json_file(path)?,
            None => ProcessOptions::default(),
        };
        if let Some(colors) = self.colors {
            options.color_count = colors;
        }
        if let Some(size) = self.min_region_size {
            options.min_region_size = size;
        }
        if let Some(size) = self.min_feature_size {
            options.min_feature_size = size;
        }
        options.validate()?;
        Ok(options)
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laser_layers=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let cli = Cli::parse();

    let options = match cli.options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let image = match load_image_file(&cli.input) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error reading input file '{}': {}", cli.input.display(), e);
            process::exit(2);
        }
    };

    let pipeline = LayerPipeline::new();
    let result = match pipeline.process(&image, &options, |event| {
        tracing::info!(percent = event.percent, "{}", event.message);
    }) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error processing image: {}", e);
            process::exit(3);
        }
    };

    match pipeline.export(&cli.output, &result.stack, &options) {
        Ok(manifest) => {
            println!(
                "Wrote {} layers from '{}' to '{}'",
                manifest.layers.len(),
                cli.input.display(),
                cli.output.display()
            );
            for layer in &manifest.layers {
                println!(
                    "  {}  {}  {:>6.2}%",
                    layer.file, layer.color, layer.coverage
                );
            }
        }
        Err(e) => {
            eprintln!(
                "Error writing output directory '{}': {}",
                cli.output.display(),
                e
            );
            process::exit(4);
        }
    }
}
