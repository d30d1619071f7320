//! Middlebury `.flo` flow files.
//!
//! Layout (little-endian): the float `202021.25` (bytes `PIEH`), width and
//! height as `i32`, then `width * height` interleaved `(dx, dy)` f32 pairs
//! in row-major order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{FlowError, Result};
use crate::frame::FlowField;

/// Sanity tag at the start of every file.
pub const FLO_TAG: f32 = 202021.25;

/// Encode a flow field into `writer`.
pub fn write_flo<W: Write>(flow: &FlowField, writer: &mut W) -> Result<()> {
    let (h, w) = (flow.height(), flow.width());
    if flow.channels() != 2 {
        return Err(FlowError::InvalidFlowDimensions {
            width: w,
            height: h,
            channels: flow.channels(),
        });
    }

    writer.write_f32::<LittleEndian>(FLO_TAG)?;
    writer.write_i32::<LittleEndian>(w as i32)?;
    writer.write_i32::<LittleEndian>(h as i32)?;
    for row in 0..h {
        for col in 0..w {
            let (dx, dy) = flow.at(row, col);
            writer.write_f32::<LittleEndian>(dx)?;
            writer.write_f32::<LittleEndian>(dy)?;
        }
    }
    Ok(())
}

/// Decode a flow field from `reader`.
pub fn read_flo<R: Read>(reader: &mut R) -> Result<FlowField> {
    let tag = reader.read_f32::<LittleEndian>()?;
    if tag != FLO_TAG {
        return Err(FlowError::InvalidFlowFile(format!("bad tag {tag}")));
    }
    let width = reader.read_i32::<LittleEndian>()?;
    let height = reader.read_i32::<LittleEndian>()?;
    if width <= 0 || height <= 0 {
        return Err(FlowError::InvalidFlowFile(format!(
            "non-positive dimensions {width}x{height}"
        )));
    }

    let (w, h) = (width as usize, height as usize);
    let mut flow = FlowField::zeros(h, w);
    for row in 0..h {
        for col in 0..w {
            flow.data[[row, col, 0]] = reader.read_f32::<LittleEndian>()?;
            flow.data[[row, col, 1]] = reader.read_f32::<LittleEndian>()?;
        }
    }
    Ok(flow)
}

pub fn save_flo(flow: &FlowField, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_flo(flow, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn load_flo(path: &Path) -> Result<FlowField> {
    let mut reader = BufReader::new(File::open(path)?);
    read_flo(&mut reader)
}
