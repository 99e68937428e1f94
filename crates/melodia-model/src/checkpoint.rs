//! Checkpoint file loading and saving.
//!
//! The checkpoint is a safetensors file:
//! - 8-byte little-endian header size
//! - JSON header with tensor metadata (name, dtype, shape, data offsets)
//! - Raw little-endian tensor data
//!
//! Tensor names are the PyTorch `state_dict` names of the reference model
//! (`embeddings.weight`, `lstm.weight_ih_l0`, ...), so a converted reference
//! checkpoint loads directly. Only dtype `F32` is accepted.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde::Deserialize;
use serde_json::json;

use crate::{LstmConfig, LstmModel, ModelError, ModelResult};

/// A memory-mapped read-only file handle.
///
/// The mapped region remains valid for the lifetime of this struct.
pub struct MappedFile {
    mmap: memmap2::Mmap,
    size: usize,
}

impl MappedFile {
    /// Map a file into memory.
    ///
    /// # Safety
    /// The file must not be modified while mapped. Checkpoints are
    /// read-only model weights, so this holds in practice.
    pub fn open(path: &Path) -> ModelResult<Self> {
        let file = File::open(path).map_err(|e| {
            ModelError::CheckpointLoad(format!("failed to open {}: {e}", path.display()))
        })?;

        let metadata = file.metadata().map_err(|e| {
            ModelError::CheckpointLoad(format!(
                "failed to read metadata for {}: {e}",
                path.display()
            ))
        })?;
        let size = metadata.len() as usize;

        // Safety: read-only mapping of a file nothing else writes to.
        let mmap = unsafe {
            memmap2::Mmap::map(&file).map_err(|e| {
                ModelError::CheckpointLoad(format!("failed to mmap {}: {e}", path.display()))
            })?
        };

        Ok(MappedFile { mmap, size })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn slice(&self, offset: usize, len: usize) -> ModelResult<&[u8]> {
        let end = offset.checked_add(len).ok_or_else(|| {
            ModelError::CheckpointLoad(format!(
                "slice at offset {offset} with length {len} overflows"
            ))
        })?;
        if end > self.size {
            return Err(ModelError::CheckpointLoad(format!(
                "slice [{offset}..{end}] exceeds file size {}",
                self.size,
            )));
        }
        Ok(&self.mmap[offset..end])
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Metadata for a single tensor in the checkpoint header.
#[derive(Debug, Clone, Deserialize)]
struct TensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

impl TensorInfo {
    /// Byte span of the tensor data, or `None` when the offsets are
    /// reversed. Offsets come straight from the file and are untrusted.
    fn byte_size(&self) -> Option<usize> {
        self.data_offsets[1].checked_sub(self.data_offsets[0])
    }
}

struct Header {
    tensors: HashMap<String, TensorInfo>,
    data_offset: usize,
}

fn parse_header(mapped: &MappedFile) -> ModelResult<Header> {
    let bytes = mapped.as_bytes();

    if bytes.len() < 8 {
        return Err(ModelError::CheckpointLoad(
            "file too small for checkpoint header".into(),
        ));
    }

    let header_size = (&bytes[..8])
        .read_u64::<LittleEndian>()
        .map_err(|e| ModelError::CheckpointLoad(format!("failed to read header size: {e}")))?
        as usize;

    if 8 + header_size > bytes.len() {
        return Err(ModelError::CheckpointLoad(format!(
            "header size {header_size} exceeds file size {}",
            bytes.len()
        )));
    }

    let header_str = std::str::from_utf8(&bytes[8..8 + header_size])
        .map_err(|e| ModelError::CheckpointLoad(format!("invalid UTF-8 in header: {e}")))?;

    // The header is a map of tensor_name -> TensorInfo, with an optional
    // "__metadata__" key we skip.
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(header_str)
        .map_err(|e| ModelError::CheckpointLoad(format!("invalid header JSON: {e}")))?;

    let mut tensors = HashMap::new();
    for (key, value) in raw {
        if key == "__metadata__" {
            continue;
        }
        let info: TensorInfo = serde_json::from_value(value).map_err(|e| {
            ModelError::CheckpointLoad(format!("failed to parse tensor '{key}': {e}"))
        })?;
        tensors.insert(key, info);
    }

    Ok(Header {
        tensors,
        data_offset: 8 + header_size,
    })
}

fn read_tensor(
    mapped: &MappedFile,
    header: &Header,
    name: &str,
    expected_shape: &[usize],
) -> ModelResult<Vec<f32>> {
    let info = header
        .tensors
        .get(name)
        .ok_or_else(|| ModelError::CheckpointLoad(format!("tensor '{name}' not found")))?;

    if info.dtype != "F32" {
        return Err(ModelError::UnsupportedDtype(info.dtype.clone()));
    }
    if info.shape != expected_shape {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: expected_shape.to_vec(),
            got: info.shape.clone(),
        });
    }

    let byte_size = info.byte_size().ok_or_else(|| {
        ModelError::CheckpointLoad(format!(
            "tensor '{name}' has reversed data offsets [{}, {}]",
            info.data_offsets[0], info.data_offsets[1]
        ))
    })?;

    let count: usize = expected_shape.iter().product();
    if byte_size != count * 4 {
        return Err(ModelError::CheckpointLoad(format!(
            "tensor '{name}' has {byte_size} bytes, shape implies {}",
            count * 4
        )));
    }

    let start = header
        .data_offset
        .checked_add(info.data_offsets[0])
        .ok_or_else(|| {
            ModelError::CheckpointLoad(format!(
                "tensor '{name}' data offset {} overflows",
                info.data_offsets[0]
            ))
        })?;
    let bytes = mapped.slice(start, count * 4)?;
    let mut out = vec![0.0f32; count];
    LittleEndian::read_f32_into(bytes, &mut out);
    Ok(out)
}

/// Load a model from a checkpoint file, validating every tensor against the
/// given configuration.
pub fn load(path: &Path, config: LstmConfig) -> ModelResult<LstmModel> {
    let mapped = MappedFile::open(path)?;
    let header = parse_header(&mapped)?;

    let v = config.vocab_size;
    let e = config.embedding_dim;
    let h = config.hidden_dim;

    let embeddings = read_tensor(&mapped, &header, "embeddings.weight", &[v, e])?;
    let w_ih = read_tensor(&mapped, &header, "lstm.weight_ih_l0", &[4 * h, e])?;
    let w_hh = read_tensor(&mapped, &header, "lstm.weight_hh_l0", &[4 * h, h])?;
    let b_ih = read_tensor(&mapped, &header, "lstm.bias_ih_l0", &[4 * h])?;
    let b_hh = read_tensor(&mapped, &header, "lstm.bias_hh_l0", &[4 * h])?;
    let w_out = read_tensor(&mapped, &header, "linear.weight", &[v, h])?;
    let b_out = read_tensor(&mapped, &header, "linear.bias", &[v])?;

    LstmModel::from_parameters(config, embeddings, w_ih, w_hh, b_ih, b_hh, w_out, b_out)
}

/// Write a model's parameters as a checkpoint file.
pub fn save(model: &LstmModel, path: &Path) -> ModelResult<()> {
    let params = model.parameters();

    let mut header = serde_json::Map::new();
    let mut offset = 0usize;
    for (name, data, shape) in &params {
        let len = data.len() * 4;
        header.insert(
            name.to_string(),
            json!({
                "dtype": "F32",
                "shape": shape,
                "data_offsets": [offset, offset + len],
            }),
        );
        offset += len;
    }

    let header_bytes = serde_json::to_vec(&serde_json::Value::Object(header))
        .map_err(|e| ModelError::CheckpointLoad(format!("failed to encode header: {e}")))?;

    let mut file = File::create(path).map_err(|e| {
        ModelError::CheckpointLoad(format!("failed to create {}: {e}", path.display()))
    })?;

    let write_err = |e: std::io::Error| {
        ModelError::CheckpointLoad(format!("failed to write {}: {e}", path.display()))
    };

    file.write_all(&(header_bytes.len() as u64).to_le_bytes())
        .map_err(write_err)?;
    file.write_all(&header_bytes).map_err(write_err)?;

    let mut buf = Vec::new();
    for (_, data, _) in &params {
        buf.clear();
        buf.resize(data.len() * 4, 0);
        LittleEndian::write_f32_into(data, &mut buf);
        file.write_all(&buf).map_err(write_err)?;
    }

    Ok(())
}
