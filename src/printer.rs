use log::{debug, info};

use crate::{
    command::{frame, Command, INVALIDATE_LEN},
    error::Error,
    media::LabelWidth,
    model::Model,
    packbits::{encode, EncodedLine},
    raster::{rasterize, RasterImage},
    transport::Transport,
};

/// Feed margin used for continuous media, in dots.
pub const DEFAULT_FEED: u16 = 35;

/// Drives one print job at a time through the pipeline and hands the framed
/// stream to its transport.
pub struct Printer<T: Transport> {
    transport: T,
    vendor_id: u16,
    product_id: u16,
    model: Option<Model>,
}

impl<T: Transport> Printer<T> {
    pub fn new(transport: T, vendor_id: u16, product_id: u16) -> Self {
        Printer {
            transport,
            vendor_id,
            product_id,
            model: Model::from_pid(product_id).filter(|m| m.vid() == vendor_id),
        }
    }

    pub fn for_model(transport: T, model: Model) -> Self {
        Printer {
            transport,
            vendor_id: model.vid(),
            product_id: model.pid(),
            model: Some(model),
        }
    }

    pub fn model(&self) -> Option<Model> {
        self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Print one label.
    ///
    /// The whole job is rasterized, encoded and framed in memory first; the
    /// single transport write is the last step, so any failure before it
    /// sends nothing to the device. Nothing is retried.
    pub fn print(
        &mut self,
        image: &RasterImage,
        options: &PrintOptions,
        compression: &CompressionOptions,
    ) -> Result<(), Error> {
        if let Some(model) = self.model {
            if !model.supports(options.label_width()) {
                return Err(Error::UnsupportedMedia(format!(
                    "{} on {:?}",
                    options.label_width(),
                    model
                )));
            }
        }

        let options = self.job_options(options);
        let data = render(image, &options, compression)?;
        info!(
            "sending {} bytes to {:04x}:{:04x}",
            data.len(),
            self.vendor_id,
            self.product_id
        );
        self.transport.send(self.vendor_id, self.product_id, &data)
    }

    /// Cancel printing
    ///
    /// Sends the invalidate and initialize sequence, which drops whatever the
    /// printer has buffered.
    pub fn cancel(&mut self) -> Result<(), Error> {
        let mut buf = Vec::new();
        Command::Initialize {
            invalidate: self.invalidate_len(),
        }
        .write_to(&mut buf)?;
        debug!("cancel {:04x}:{:04x}", self.vendor_id, self.product_id);
        self.transport.send(self.vendor_id, self.product_id, &buf)
    }

    fn invalidate_len(&self) -> usize {
        self.model.map_or(INVALIDATE_LEN, |model| model.invalidate_len())
    }

    // the model decides how long the invalidate preamble is
    fn job_options(&self, options: &PrintOptions) -> PrintOptions {
        match self.model {
            Some(_) => options.set_invalidate_len(self.invalidate_len()),
            None => *options,
        }
    }
}

/// Rasterizes, encodes and frames a job without sending it.
pub fn render(
    image: &RasterImage,
    options: &PrintOptions,
    compression: &CompressionOptions,
) -> Result<Vec<u8>, Error> {
    let raster = rasterize(image, options)?;
    let lines = raster
        .lines()
        .map(|line| encode(&line, compression.enable))
        .collect::<Result<Vec<EncodedLine>, Error>>()?;
    debug!(
        "{} lines encoded, {} run-length",
        lines.len(),
        lines
            .iter()
            .filter(|l| matches!(l, EncodedLine::RunLength(_)))
            .count()
    );
    frame(&lines, options, compression)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCut {
    Enabled(u8),
    Disabled,
}

/// Per-job print settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    label_width: LabelWidth,
    landscape: bool,
    auto_cut: AutoCut,
    cut_at_end: bool,
    high_resolution: bool,
    quality: bool,
    feed: u16,
    invalidate_len: usize,
}

impl PrintOptions {
    /// Initialize options with default values for the given label.
    ///
    /// Portrait, auto cut after every label, cut at end, normal resolution
    /// and a 35 dot feed margin.
    ///
    /// # Example
    ///
    /// ```
    /// use qlprint::{LabelWidth, PrintOptions};
    ///
    /// let options = PrintOptions::new(LabelWidth::Continuous62).landscape(true);
    /// assert!(options.is_landscape());
    /// ```
    pub fn new(label_width: LabelWidth) -> PrintOptions {
        PrintOptions {
            label_width,
            landscape: false,
            auto_cut: AutoCut::Enabled(1),
            cut_at_end: true,
            high_resolution: false,
            quality: false,
            feed: DEFAULT_FEED,
            invalidate_len: INVALIDATE_LEN,
        }
    }

    pub fn landscape(self, landscape: bool) -> Self {
        PrintOptions { landscape, ..self }
    }

    /// Enable auto cut every `size` labels
    pub fn enable_auto_cut(self, size: u8) -> Self {
        PrintOptions {
            auto_cut: AutoCut::Enabled(size),
            ..self
        }
    }

    pub fn disable_auto_cut(self) -> Self {
        PrintOptions {
            auto_cut: AutoCut::Disabled,
            ..self
        }
    }

    pub fn cut_at_end(self, flag: bool) -> Self {
        PrintOptions {
            cut_at_end: flag,
            ..self
        }
    }

    pub fn high_resolution(self, high: bool) -> Self {
        PrintOptions {
            high_resolution: high,
            ..self
        }
    }

    /// Give print quality priority over speed.
    pub fn quality(self, quality: bool) -> Self {
        PrintOptions { quality, ..self }
    }

    pub fn set_feed_in_dots(self, feed: u16) -> Self {
        PrintOptions { feed, ..self }
    }

    /// Number of zero bytes sent ahead of the initialize command.
    ///
    /// [`Printer`] sets this from its model; 200 is enough for models older
    /// than the QL-800.
    pub fn set_invalidate_len(self, invalidate_len: usize) -> Self {
        PrintOptions {
            invalidate_len,
            ..self
        }
    }

    pub fn label_width(&self) -> LabelWidth {
        self.label_width
    }

    pub fn is_landscape(&self) -> bool {
        self.landscape
    }

    pub fn auto_cut(&self) -> AutoCut {
        self.auto_cut
    }

    pub fn is_cut_at_end(&self) -> bool {
        self.cut_at_end
    }

    pub fn is_high_resolution(&self) -> bool {
        self.high_resolution
    }

    pub fn prefers_quality(&self) -> bool {
        self.quality
    }

    pub fn feed(&self) -> u16 {
        self.feed
    }

    pub fn invalidate_len(&self) -> usize {
        self.invalidate_len
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionOptions {
    pub enable: bool,
}

impl CompressionOptions {
    pub fn enabled() -> Self {
        CompressionOptions { enable: true }
    }

    pub fn disabled() -> Self {
        CompressionOptions { enable: false }
    }
}
