//! ESC/POS byte constants and a small job builder
//!
//! Only the commands the simulator has to recognise live here: the two cut
//! markers that terminate a job, the `GS v 0` raster signature, and the
//! handful of ESC/GS selectors the text decoder knows how to skip.

/// ESC - introduces formatting commands
pub const ESC: u8 = 0x1B;
/// GS - introduces the extended command family (cut, raster, size)
pub const GS: u8 = 0x1D;
/// LF - print and feed one line
pub const LF: u8 = 0x0A;
/// CR - carriage return, ignored by thermal printers
pub const CR: u8 = 0x0D;

/// GS V 0 - full cut
pub const FULL_CUT: [u8; 3] = [GS, 0x56, 0x00];

/// GS V - cut with one trailing parameter byte
pub const PARTIAL_CUT_PREFIX: [u8; 2] = [GS, 0x56];

/// GS v 0 - raster bit image
pub const RASTER_SIGNATURE: [u8; 3] = [GS, 0x76, 0x30];

/// Signature + mode byte + xL xH yL yH
pub const RASTER_HEADER_LEN: usize = 8;

/// ESC @ - initialize printer
pub const ESC_INIT: u8 = 0x40;
/// ESC a n - alignment
pub const ESC_ALIGN: u8 = 0x61;
/// ESC E n - bold on/off
pub const ESC_BOLD: u8 = 0x45;
/// ESC - n - underline
pub const ESC_UNDERLINE: u8 = 0x2D;
/// ESC ! n - print mode
pub const ESC_PRINT_MODE: u8 = 0x21;
/// ESC d n - print and feed n lines
pub const ESC_FEED: u8 = 0x64;

/// GS V - paper cut
pub const GS_CUT: u8 = 0x56;
/// GS v - raster image
pub const GS_RASTER: u8 = 0x76;

/// ESC/POS job builder
///
/// Produces the byte streams a POS application would send to a networked
/// receipt printer. Used for the test page and for driving the decoders in
/// tests.
#[derive(Debug, Clone, Default)]
pub struct JobBuilder {
    buf: Vec<u8>,
}

impl JobBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    /// Initialize printer (ESC @)
    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, ESC_INIT]);
        self
    }

    // === Text Output ===

    /// Write raw ASCII text
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(LF);
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, ESC_FEED, lines]);
        self
    }

    // === Style ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, ESC_ALIGN, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, ESC_ALIGN, 0x00]);
        self
    }

    /// Enable or disable bold text
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, ESC_BOLD, u8::from(on)]);
        self
    }

    // === Raster ===

    /// Append a GS v 0 raster block
    ///
    /// `data` is row-major, MSB-first, `width_bytes * height` bytes long.
    pub fn raster(&mut self, width_bytes: u16, height: u16, data: &[u8]) -> &mut Self {
        let [xl, xh] = width_bytes.to_le_bytes();
        let [yl, yh] = height.to_le_bytes();
        self.buf.extend_from_slice(&RASTER_SIGNATURE);
        self.buf.extend_from_slice(&[0x00, xl, xh, yl, yh]);
        self.buf.extend_from_slice(data);
        self
    }

    // === Paper Control ===

    /// Full cut (GS V 0)
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&FULL_CUT);
        self
    }

    /// Partial cut (GS V 1)
    pub fn cut_partial(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&PARTIAL_CUT_PREFIX);
        self.buf.push(0x01);
        self
    }

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Current length of the job
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the built bytes
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// The ticket sent by `test-print`: identifies the simulator's address and
/// ends with a full cut so it frames as exactly one job.
pub fn test_page(ip: &str, port: u16) -> Vec<u8> {
    let mut b = JobBuilder::new();
    b.init()
        .line("SimulatedPrinter")
        .line(&format!("IP Address : {ip}"))
        .line(&format!("Port       : {port}"))
        .feed(3)
        .cut();
    b.build()
}
