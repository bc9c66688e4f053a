use crate::config::INLINE_DATA_LEN;

/// Write-data source declared by a descriptor.
enum TxSource<'b> {
    None,
    External(&'b [u8]),
    Inline(&'b [u8]),
}

/// One transfer request inside a batch.
///
/// Command, address and dummy phases have per-call variable widths: a
/// descriptor may carry a 7-bit command, a 24-bit address, two dummy bytes
/// and a read phase, or any subset of those. Write data comes either from an
/// external buffer borrowed for the life of the batch or from a small copy
/// held inline by the record.
///
/// A descriptor with no phase at all is rejected when pushed.
pub struct TransferDescriptor<'b> {
    command: u16,
    command_bits: u8,
    address: u64,
    address_bits: u8,
    dummy_bytes: u8,
    tx: TxSource<'b>,
    rx: Option<&'b mut [u8]>,
}

impl<'b> TransferDescriptor<'b> {
    /// An empty descriptor; add phases with the builder methods.
    pub fn new() -> Self {
        Self {
            command: 0,
            command_bits: 0,
            address: 0,
            address_bits: 0,
            dummy_bytes: 0,
            tx: TxSource::None,
            rx: None,
        }
    }

    /// Command phase, up to 16 bits, sent most-significant-bit first.
    pub fn command(mut self, value: u16, bits: u8) -> Self {
        self.command = value;
        self.command_bits = bits;
        self
    }

    /// Address phase, up to 64 bits, sent most-significant-bit first.
    pub fn address(mut self, value: u64, bits: u8) -> Self {
        self.address = value;
        self.address_bits = bits;
        self
    }

    /// Dummy phase: `bytes` filler bytes clocked out before data.
    pub fn dummy(mut self, bytes: u8) -> Self {
        self.dummy_bytes = bytes;
        self
    }

    /// Write phase from an external buffer, borrowed until the batch drains.
    pub fn write(mut self, data: &'b [u8]) -> Self {
        self.tx = TxSource::External(data);
        self
    }

    /// Write phase copied into the record's inline buffer
    /// (at most [`INLINE_DATA_LEN`] bytes).
    pub fn write_inline(mut self, data: &'b [u8]) -> Self {
        self.tx = TxSource::Inline(data);
        self
    }

    /// Read phase into a caller buffer, filled when the batch drains.
    pub fn read(mut self, buf: &'b mut [u8]) -> Self {
        self.rx = Some(buf);
        self
    }

    fn tx_len(&self) -> usize {
        match self.tx {
            TxSource::None => 0,
            TxSource::External(b) | TxSource::Inline(b) => b.len(),
        }
    }

    /// Checks phase widths and rejects the all-empty descriptor.
    pub(crate) fn validate(&self) -> Result<(), RecordError> {
        if self.command_bits > 16 || self.address_bits > 64 {
            return Err(RecordError::WidthOutOfRange);
        }
        let no_data = self.tx_len() == 0
            && self.rx.as_ref().map_or(true, |b| b.is_empty());
        if self.command_bits == 0
            && self.address_bits == 0
            && self.dummy_bytes == 0
            && no_data
        {
            return Err(RecordError::Degenerate);
        }
        Ok(())
    }

    /// Converts into an owned record, copying inline write data.
    pub(crate) fn into_record(
        self,
    ) -> Result<QueuedTransfer<'b>, RecordError> {
        self.validate()?;
        let tx = match self.tx {
            TxSource::None => TxData::None,
            TxSource::External(b) => TxData::External(b),
            TxSource::Inline(b) => {
                if b.len() > INLINE_DATA_LEN {
                    return Err(RecordError::InlineOverflow);
                }
                let mut data = [0u8; INLINE_DATA_LEN];
                data[..b.len()].copy_from_slice(b);
                TxData::Inline { data, len: b.len() as u8 }
            }
        };
        Ok(QueuedTransfer {
            command: self.command,
            command_bits: self.command_bits,
            address: self.address,
            address_bits: self.address_bits,
            dummy_bytes: self.dummy_bytes,
            tx,
            rx: self.rx,
        })
    }
}

impl Default for TransferDescriptor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a descriptor could not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordError {
    Degenerate,
    WidthOutOfRange,
    InlineOverflow,
}

enum TxData<'b> {
    None,
    External(&'b [u8]),
    Inline { data: [u8; INLINE_DATA_LEN], len: u8 },
}

/// An owned, in-flight transfer record.
///
/// The engine owns the record from submission until it is drained; the
/// driver borrows it in `submit` and `collect`. When the record leaves the
/// batch ring it is released exactly once, by being dropped.
pub struct QueuedTransfer<'b> {
    command: u16,
    command_bits: u8,
    address: u64,
    address_bits: u8,
    dummy_bytes: u8,
    tx: TxData<'b>,
    rx: Option<&'b mut [u8]>,
}

impl QueuedTransfer<'_> {
    /// Command phase rendered MSB-first; returns the buffer and the byte
    /// count (`ceil(bits / 8)`).
    pub fn command_bytes(&self) -> ([u8; 2], usize) {
        let n = (self.command_bits as usize).div_ceil(8);
        let be = self.command.to_be_bytes();
        let mut out = [0u8; 2];
        out[..n].copy_from_slice(&be[2 - n..]);
        (out, n)
    }

    /// Address phase rendered MSB-first; returns the buffer and the byte
    /// count (`ceil(bits / 8)`).
    pub fn address_bytes(&self) -> ([u8; 8], usize) {
        let n = (self.address_bits as usize).div_ceil(8);
        let be = self.address.to_be_bytes();
        let mut out = [0u8; 8];
        out[..n].copy_from_slice(&be[8 - n..]);
        (out, n)
    }

    /// Number of filler bytes between the address and data phases.
    pub fn dummy_len(&self) -> usize {
        self.dummy_bytes as usize
    }

    /// Write-phase data, whatever its source.
    pub fn tx_data(&self) -> &[u8] {
        match &self.tx {
            TxData::None => &[],
            TxData::External(b) => b,
            TxData::Inline { data, len } => &data[..*len as usize],
        }
    }

    /// Read-phase length.
    pub fn rx_len(&self) -> usize {
        self.rx.as_ref().map_or(0, |b| b.len())
    }

    /// Read-phase buffer, for the driver to fill on completion.
    pub fn rx_mut(&mut self) -> Option<&mut [u8]> {
        self.rx.as_deref_mut()
    }

    /// Write data and read buffer borrowed together, for full-duplex
    /// drivers.
    pub fn split_tx_rx(&mut self) -> (&[u8], Option<&mut [u8]>) {
        let tx: &[u8] = match &self.tx {
            TxData::None => &[],
            TxData::External(b) => b,
            TxData::Inline { data, len } => &data[..*len as usize],
        };
        (tx, self.rx.as_deref_mut())
    }
}
