//
// cargo run -- --model QL570 --label 62 --landscape --compress label.png
// cargo run -- --vid 0x04f9 --pid 0x2029 --qr https://example.com/c/AB12 --output job.bin
//
use log::{debug, error};
use std::{env, fs::File, process::ExitCode};

use qlprint::{
    CompressionOptions, Error, LabelWidth, Model, PrintOptions, Printer, RasterImage, Transport,
    UsbTransport, WriterTransport,
};

/// Pixels per QR module for `--qr` labels.
const QR_MODULE_PX: u32 = 8;

#[derive(Debug)]
enum Source {
    File(String),
    Qr(String),
}

#[derive(Debug)]
struct Args {
    vendor_id: u16,
    product_id: u16,
    model: Option<Model>,
    label: LabelWidth,
    landscape: bool,
    compress: bool,
    output: Option<String>,
    source: Source,
}

fn print_usage() {
    println!("Usage: qlprint [OPTIONS] (FILE.png | --qr TEXT)");
    println!("Options:");
    println!("  --model NAME   Printer model, e.g. QL570 (sets vendor and product id)");
    println!("  --vid ID       USB vendor id, decimal or 0x hex (default 0x04f9)");
    println!("  --pid ID       USB product id, decimal or 0x hex");
    println!("  --label NAME   Label width, e.g. \"62-mm-wide continuous\" or 102 (default 62)");
    println!("  --landscape    Rotate the image 90 degrees before printing");
    println!("  --compress     Send PackBits compressed raster lines");
    println!("  --output FILE  Write the command stream to FILE instead of the printer");
    println!("  --qr TEXT      Print a QR code for TEXT instead of an image file");
    println!("\nDefaults are read from QLPRINT_MODEL, QLPRINT_VENDOR_ID, QLPRINT_PRODUCT_ID");
    println!("and QLPRINT_LABEL, also from a .env file.");
}

fn parse_id(s: &str) -> Result<u16, Error> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|_| Error::InvalidConfig(format!("invalid USB id {}", s)))
}

fn parse_args(argv: &[String]) -> Result<Args, Error> {
    let mut model = match env::var("QLPRINT_MODEL") {
        Ok(name) => Some(name.parse::<Model>()?),
        Err(_) => None,
    };
    let mut vendor_id = match env::var("QLPRINT_VENDOR_ID") {
        Ok(id) => Some(parse_id(&id)?),
        Err(_) => None,
    };
    let mut product_id = match env::var("QLPRINT_PRODUCT_ID") {
        Ok(id) => Some(parse_id(&id)?),
        Err(_) => None,
    };
    let mut label = env::var("QLPRINT_LABEL")
        .unwrap_or_else(|_| "62".to_string())
        .parse::<LabelWidth>()?;
    let mut landscape = false;
    let mut compress = false;
    let mut output = None;
    let mut source = None;

    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(format!("{} needs a value", name)))
        };
        match arg.as_str() {
            "--model" => model = Some(value("--model")?.parse::<Model>()?),
            "--vid" => vendor_id = Some(parse_id(&value("--vid")?)?),
            "--pid" => product_id = Some(parse_id(&value("--pid")?)?),
            "--label" => label = value("--label")?.parse::<LabelWidth>()?,
            "--output" => output = Some(value("--output")?),
            "--qr" => source = Some(Source::Qr(value("--qr")?)),
            "--landscape" => landscape = true,
            "--compress" => compress = true,
            other if other.starts_with("--") => {
                return Err(Error::InvalidConfig(format!("unknown option {}", other)))
            }
            file => source = Some(Source::File(file.to_string())),
        }
    }

    let source = source.ok_or_else(|| Error::InvalidConfig("nothing to print".to_string()))?;
    let vendor_id = vendor_id
        .or_else(|| model.map(|m| m.vid()))
        .unwrap_or(qlprint::BROTHER_VENDOR_ID);
    let product_id = product_id
        .or_else(|| model.map(|m| m.pid()))
        .ok_or_else(|| Error::InvalidConfig("either --model or --pid is required".to_string()))?;

    Ok(Args {
        vendor_id,
        product_id,
        model,
        label,
        landscape,
        compress,
        output,
        source,
    })
}

fn run(args: Args) -> Result<(), Error> {
    let image = match &args.source {
        Source::File(path) => RasterImage::open(path)?,
        Source::Qr(text) => RasterImage::qr_code(text, QR_MODULE_PX)?,
    };
    let options = PrintOptions::new(args.label).landscape(args.landscape);
    let compression = CompressionOptions {
        enable: args.compress,
    };

    let transport: Box<dyn Transport> = match &args.output {
        Some(path) => Box::new(WriterTransport::new(File::create(path)?)),
        None => Box::new(UsbTransport::new()?),
    };

    let mut printer = match args.model {
        Some(model) if model.vid() == args.vendor_id && model.pid() == args.product_id => {
            Printer::for_model(transport, model)
        }
        _ => Printer::new(transport, args.vendor_id, args.product_id),
    };
    debug!("{:?}", printer.model());

    printer.print(&image, &options, &compression)
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();

    let argv: Vec<String> = env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let result = parse_args(&argv).and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?}", err);
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
