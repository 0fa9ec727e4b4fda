use bitflags::bitflags;

const CAPTURE_PATTERN: [u8; 4] = *b"OggS";
const MAX_SEGMENTS: usize = 255;
const CRC_OFFSET: usize = 22;

// CRC-32 as used by Ogg: polynomial 0x04C11DB7, not reflected, no initial or final inversion
const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0; 256];
    let mut index = 0u32;

    while index < 256 {
        let mut crc = index << 24;
        let mut bit = 0;

        while bit < 8 {
            crc = if crc & 0x8000_0000 == 0 {
                crc << 1
            } else {
                (crc << 1) ^ 0x04C1_1DB7
            };
            bit += 1;
        }

        table[index as usize] = crc;
        index += 1;
    }

    table
}

pub(crate) fn crc32(data: &[u8]) -> u32 {
    data.iter().fold(0, |crc, &byte| {
        (crc << 8) ^ CRC_TABLE[usize::from(crc.to_be_bytes()[0] ^ byte)]
    })
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct PageFlags: u8 {
        const CONTINUED = 0x01;
        const FIRST = 0x02;
        const LAST = 0x04;
    }
}

/// Frames packets of one logical bitstream into Ogg pages.
///
/// Packets are gathered onto a page until its segment table is full. A packet that does not fit
/// spills onto continued pages, and [`OggWriter::flush_page`] ends a page early where the codec
/// needs a packet to start on a fresh one.
pub(crate) struct OggWriter {
    output: Vec<u8>,
    serial: u32,
    sequence: u32,
    // lacing values and body of the page being filled
    segments: Vec<u8>,
    body: Vec<u8>,
    // position of the last packet completed on the pending page
    granule: Option<u64>,
    // the pending page starts in the middle of a packet
    continued: bool,
}

impl OggWriter {
    pub(crate) fn new(serial: u32) -> Self {
        Self {
            output: Vec::new(),
            serial,
            sequence: 0,
            segments: Vec::with_capacity(MAX_SEGMENTS),
            body: Vec::new(),
            granule: None,
            continued: false,
        }
    }

    /// Appends a packet ending at `granule`. The last packet of the stream closes the final page.
    pub(crate) fn write_packet(&mut self, packet: &[u8], granule: u64, last: bool) {
        let full_segments = packet.len() / 255;
        let mut rest = packet;

        // a packet whose length is a multiple of 255 ends with an empty segment
        for index in 0..=full_segments {
            if self.segments.len() == MAX_SEGMENTS {
                self.emit_page(false);
                self.continued = index > 0;
            }

            let (segment, remaining) = rest.split_at(rest.len().min(255));
            self.segments.push(lacing_value(segment.len()));
            self.body.extend_from_slice(segment);
            rest = remaining;
        }

        self.granule = Some(granule);

        if last {
            self.emit_page(true);
        }
    }

    /// Ends the pending page, if it holds anything.
    pub(crate) fn flush_page(&mut self) {
        if !self.segments.is_empty() {
            self.emit_page(false);
        }
    }

    fn emit_page(&mut self, last: bool) {
        let mut flags = PageFlags::empty();
        flags.set(PageFlags::CONTINUED, self.continued);
        flags.set(PageFlags::FIRST, self.sequence == 0);
        flags.set(PageFlags::LAST, last);

        let segments = std::mem::take(&mut self.segments);
        let body = std::mem::take(&mut self.body);
        // pages on which no packet ends carry no position
        let granule = self.granule.take().unwrap_or(u64::MAX);

        self.write_page(flags, granule, &segments, &body);
        self.continued = false;
    }

    fn write_page(&mut self, flags: PageFlags, granule: u64, segments: &[u8], body: &[u8]) {
        let start = self.output.len();

        self.output.extend_from_slice(&CAPTURE_PATTERN);
        self.output.push(0); // stream structure version
        self.output.push(flags.bits());
        self.output.extend_from_slice(&granule.to_le_bytes());
        self.output.extend_from_slice(&self.serial.to_le_bytes());
        self.output.extend_from_slice(&self.sequence.to_le_bytes());
        self.output.extend_from_slice(&[0; 4]);
        self.output.push(lacing_value(segments.len()));
        self.output.extend_from_slice(segments);
        self.output.extend_from_slice(body);

        let crc = crc32(&self.output[start..]);
        self.output[start + CRC_OFFSET..start + CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());

        self.sequence += 1;
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        self.flush_page();
        self.output
    }
}

// callers only pass values up to 255
#[allow(clippy::cast_possible_truncation)]
fn lacing_value(len: usize) -> u8 {
    len as u8
}

/// Splits Ogg pages back into `(packet, granule of the page it ended on, page flags)`, checking
/// every page's CRC along the way. Packets ending on the same page share its granule and flags.
#[cfg(test)]
pub(crate) fn read_packets(data: &[u8]) -> Vec<(Vec<u8>, u64, u8)> {
    let mut packets = Vec::new();
    let mut partial = Vec::new();
    let mut rest = data;
    let mut expected_sequence = 0;

    while !rest.is_empty() {
        assert_eq!(rest[..4], CAPTURE_PATTERN);
        let flags = rest[5];
        let granule = u64::from_le_bytes(rest[6..14].try_into().unwrap());
        let sequence = u32::from_le_bytes(rest[18..22].try_into().unwrap());
        let stored_crc = u32::from_le_bytes(rest[22..26].try_into().unwrap());
        let segment_count = usize::from(rest[26]);
        let segments = &rest[27..27 + segment_count];
        let body_len: usize = segments.iter().map(|&len| usize::from(len)).sum();
        let page_len = 27 + segment_count + body_len;

        let mut page = rest[..page_len].to_vec();
        page[22..26].fill(0);
        assert_eq!(crc32(&page), stored_crc);
        assert_eq!(sequence, expected_sequence);
        expected_sequence += 1;

        let mut body = &rest[27 + segment_count..page_len];
        for &len in segments {
            let (segment, remaining) = body.split_at(usize::from(len));
            partial.extend_from_slice(segment);
            body = remaining;

            if len < 255 {
                packets.push((std::mem::take(&mut partial), granule, flags));
            }
        }

        rest = &rest[page_len..];
    }

    assert!(partial.is_empty());
    packets
}
