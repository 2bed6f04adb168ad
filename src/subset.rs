//! TrueType glyph subsetting.
//!
//! Glyph ids are preserved: unused glyphs keep their slot but become empty
//! in `glyf`, so the glyph-id CIDs written into content streams stay valid.
//! Composite glyphs pull in their components. Every table other than
//! `glyf`, `loca` and `head` is copied unchanged.

use std::collections::BTreeSet;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubsetError {
    #[error("font data truncated at offset {0}")]
    Truncated(usize),
    #[error("required table '{0}' missing")]
    MissingTable(&'static str),
    #[error("font collections are not supported")]
    Collection,
}

type SubsetResult<T> = std::result::Result<T, SubsetError>;

// Composite glyph component flags.
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

fn read_u16(data: &[u8], off: usize) -> SubsetResult<u16> {
    data.get(off..off + 2)
        .map(BigEndian::read_u16)
        .ok_or(SubsetError::Truncated(off))
}

fn read_u32(data: &[u8], off: usize) -> SubsetResult<u32> {
    data.get(off..off + 4)
        .map(BigEndian::read_u32)
        .ok_or(SubsetError::Truncated(off))
}

/// A table record: tag and raw bytes.
pub(crate) struct Table {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

/// Split an sfnt file into its tables.
pub(crate) fn read_tables(font: &[u8]) -> SubsetResult<Vec<Table>> {
    if font.get(0..4) == Some(b"ttcf") {
        return Err(SubsetError::Collection);
    }
    let num_tables = read_u16(font, 4)? as usize;
    let mut tables = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let rec = 12 + i * 16;
        let tag_bytes = font.get(rec..rec + 4).ok_or(SubsetError::Truncated(rec))?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(tag_bytes);
        let offset = read_u32(font, rec + 8)? as usize;
        let length = read_u32(font, rec + 12)? as usize;
        let data = font
            .get(offset..offset + length)
            .ok_or(SubsetError::Truncated(offset))?
            .to_vec();
        tables.push(Table { tag, data });
    }
    Ok(tables)
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(BigEndian::read_u32(&word))
    })
}

/// Write tables back into an sfnt file, sorted by tag, with a fresh
/// `head.checkSumAdjustment`.
pub(crate) fn assemble(mut tables: Vec<Table>) -> Vec<u8> {
    tables.sort_by(|a, b| a.tag.cmp(&b.tag));
    let num_tables = tables.len() as u16;
    let mut pow2 = 1u16;
    let mut entry_selector = 0u16;
    while pow2 * 2 <= num_tables {
        pow2 *= 2;
        entry_selector += 1;
    }
    let search_range = pow2 * 16;

    let mut out: Vec<u8> = Vec::new();
    let mut header = Vec::with_capacity(12 + tables.len() * 16);
    header.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    header.extend_from_slice(&num_tables.to_be_bytes());
    header.extend_from_slice(&search_range.to_be_bytes());
    header.extend_from_slice(&entry_selector.to_be_bytes());
    header.extend_from_slice(&(num_tables * 16 - search_range).to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for table in &tables {
        header.extend_from_slice(&table.tag);
        header.extend_from_slice(&checksum(&table.data).to_be_bytes());
        header.extend_from_slice(&(offset as u32).to_be_bytes());
        header.extend_from_slice(&(table.data.len() as u32).to_be_bytes());
        if &table.tag == b"head" {
            head_offset = Some(offset);
        }
        offset += (table.data.len() + 3) & !3;
    }
    out.extend_from_slice(&header);
    for table in &tables {
        out.extend_from_slice(&table.data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    if let Some(head) = head_offset {
        if out.len() >= head + 12 {
            let adjust = 0xB1B0_AFBAu32.wrapping_sub(checksum(&out));
            BigEndian::write_u32(&mut out[head + 8..head + 12], adjust);
        }
    }
    out
}

fn glyph_range(loca: &[u8], long: bool, gid: usize) -> SubsetResult<(usize, usize)> {
    if long {
        Ok((read_u32(loca, gid * 4)? as usize, read_u32(loca, gid * 4 + 4)? as usize))
    } else {
        Ok((
            read_u16(loca, gid * 2)? as usize * 2,
            read_u16(loca, gid * 2 + 2)? as usize * 2,
        ))
    }
}

/// Component glyph ids referenced by a composite glyph record.
fn components(glyph: &[u8]) -> SubsetResult<Vec<u16>> {
    let mut out = Vec::new();
    if glyph.len() < 10 || (read_u16(glyph, 0)? as i16) >= 0 {
        return Ok(out);
    }
    let mut pos = 10;
    loop {
        let flags = read_u16(glyph, pos)?;
        out.push(read_u16(glyph, pos + 2)?);
        pos += 4;
        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    Ok(out)
}

/// Produce a font program containing only `used` glyphs (plus glyph 0 and
/// composite components).
pub fn subset_font(font: &[u8], used: &BTreeSet<u16>) -> SubsetResult<Vec<u8>> {
    let mut tables = read_tables(font)?;
    let find = |tables: &[Table], tag: &'static [u8; 4]| {
        tables
            .iter()
            .position(|t| &t.tag == tag)
            .ok_or(SubsetError::MissingTable(std::str::from_utf8(tag).unwrap_or("?")))
    };
    let head_idx = find(&tables, b"head")?;
    let loca_idx = find(&tables, b"loca")?;
    let glyf_idx = find(&tables, b"glyf")?;
    let maxp_idx = find(&tables, b"maxp")?;

    let long = read_u16(&tables[head_idx].data, 50)? != 0;
    let num_glyphs = read_u16(&tables[maxp_idx].data, 4)? as usize;
    let loca = &tables[loca_idx].data;
    let glyf = &tables[glyf_idx].data;

    let mut keep: BTreeSet<u16> = BTreeSet::new();
    let mut pending: Vec<u16> = std::iter::once(0).chain(used.iter().copied()).collect();
    while let Some(gid) = pending.pop() {
        if (gid as usize) >= num_glyphs || !keep.insert(gid) {
            continue;
        }
        let (start, end) = glyph_range(loca, long, gid as usize)?;
        if end > start {
            let record = glyf.get(start..end).ok_or(SubsetError::Truncated(start))?;
            pending.extend(components(record)?);
        }
    }

    let mut new_glyf: Vec<u8> = Vec::new();
    let mut new_loca: Vec<u8> = Vec::with_capacity((num_glyphs + 1) * 4);
    for gid in 0..num_glyphs {
        new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());
        if keep.contains(&(gid as u16)) {
            let (start, end) = glyph_range(loca, long, gid)?;
            if end > start {
                let record = glyf.get(start..end).ok_or(SubsetError::Truncated(start))?;
                new_glyf.extend_from_slice(record);
                while new_glyf.len() % 4 != 0 {
                    new_glyf.push(0);
                }
            }
        }
    }
    new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());

    log::debug!("subset kept {} of {num_glyphs} glyphs", keep.len());

    let head = &mut tables[head_idx].data;
    if head.len() < 52 {
        return Err(SubsetError::Truncated(head.len()));
    }
    BigEndian::write_u32(&mut head[8..12], 0);
    BigEndian::write_u16(&mut head[50..52], 1);
    tables[loca_idx].data = new_loca;
    tables[glyf_idx].data = new_glyf;
    Ok(assemble(tables))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn simple_glyph(marker: u8) -> Vec<u8> {
        // numberOfContours = 1, bbox, then filler standing in for outlines.
        let mut g = vec![0, 1, 0, 0, 0, 0, 0, 10, 0, 10];
        g.extend_from_slice(&[marker; 6]);
        g
    }

    fn composite_of(gid: u16) -> Vec<u8> {
        let mut g = vec![0xFF, 0xFF, 0, 0, 0, 0, 0, 10, 0, 10];
        g.write_u16::<BigEndian>(ARG_1_AND_2_ARE_WORDS).unwrap();
        g.write_u16::<BigEndian>(gid).unwrap();
        g.extend_from_slice(&[0, 0, 0, 0]);
        g
    }

    /// A minimal four-glyph font: 0 and 1 simple, 2 composite of 1, 3 simple.
    pub(crate) fn tiny_font() -> Vec<u8> {
        let glyphs = vec![
            simple_glyph(0xA0),
            simple_glyph(0xA1),
            composite_of(1),
            simple_glyph(0xA3),
        ];
        let mut glyf = Vec::new();
        let mut loca = Vec::new();
        for g in &glyphs {
            loca.write_u16::<BigEndian>((glyf.len() / 2) as u16).unwrap();
            glyf.extend_from_slice(g);
        }
        loca.write_u16::<BigEndian>((glyf.len() / 2) as u16).unwrap();

        let mut head = vec![0u8; 54];
        BigEndian::write_u16(&mut head[18..20], 1000);
        let mut maxp = vec![0u8; 6];
        BigEndian::write_u32(&mut maxp[0..4], 0x0000_5000);
        BigEndian::write_u16(&mut maxp[4..6], glyphs.len() as u16);

        assemble(vec![
            Table { tag: *b"head", data: head },
            Table { tag: *b"maxp", data: maxp },
            Table { tag: *b"loca", data: loca },
            Table { tag: *b"glyf", data: glyf },
            Table { tag: *b"name", data: b"keepme".to_vec() },
        ])
    }

    fn table<'a>(tables: &'a [Table], tag: &[u8; 4]) -> &'a [u8] {
        &tables.iter().find(|t| &t.tag == tag).unwrap().data
    }

    #[test]
    fn composite_pulls_in_component() {
        let used: BTreeSet<u16> = [2].into_iter().collect();
        let out = subset_font(&tiny_font(), &used).unwrap();
        let tables = read_tables(&out).unwrap();
        let loca = table(&tables, b"loca");
        let range = |gid| glyph_range(loca, true, gid).unwrap();
        assert!(range(0).1 > range(0).0, "notdef kept");
        assert!(range(1).1 > range(1).0, "component kept");
        assert!(range(2).1 > range(2).0, "used glyph kept");
        assert_eq!(range(3).0, range(3).1, "unused glyph emptied");
        assert_eq!(read_u16(table(&tables, b"head"), 50).unwrap(), 1);
        assert_eq!(table(&tables, b"name"), b"keepme");
    }

    #[test]
    fn checksum_adjustment_balances_file() {
        let used: BTreeSet<u16> = [3].into_iter().collect();
        let out = subset_font(&tiny_font(), &used).unwrap();
        assert_eq!(checksum(&out), 0xB1B0_AFBA);
    }

    #[test]
    fn out_of_range_ids_are_ignored() {
        let used: BTreeSet<u16> = [900].into_iter().collect();
        assert!(subset_font(&tiny_font(), &used).is_ok());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(subset_font(&[0, 1, 0, 0], &BTreeSet::new()).is_err());
        assert_eq!(subset_font(b"ttcf\0\0\0\0", &BTreeSet::new()), Err(SubsetError::Collection));
    }
}
