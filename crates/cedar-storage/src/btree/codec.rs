//! Fixed-width text encoding of node and header lines.
//!
//! Leaf line:
//! ```text
//! L <parent> <left> <right> <count> (<search_value> <tie_break>)*count
//! ```
//!
//! Internal line:
//! ```text
//! N <parent> <count> <child_0> (<search_value> <tie_break> <child_i>)*count
//! ```
//!
//! Header line:
//! ```text
//! <root_address> <depth>
//! ```
//!
//! Fields are separated by single spaces and the line is right-padded with
//! spaces to its fixed width, then terminated by `\n`. The node's own
//! address is not stored; the reader supplies it.

use super::key::Key;
use super::node::{Node, NodeKind};
use bytes::{BufMut, Bytes, BytesMut};
use cedar_common::{Address, CedarError, Result};
use std::fmt::Write;
use std::str::SplitAsciiWhitespace;

/// Encodes a node into a padded, newline-terminated line of `width + 1` bytes.
pub fn encode_node(node: &Node, width: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(width + 1);
    let tag = node.kind().tag() as char;

    let written = match node.kind() {
        NodeKind::Leaf => {
            let mut res = write!(
                buf,
                "{} {} {} {} {}",
                tag,
                node.parent(),
                node.left(),
                node.right(),
                node.count()
            );
            for key in node.keys() {
                res = res.and_then(|_| write!(buf, " {} {}", key.search_value, key.tie_break));
            }
            res
        }
        NodeKind::Internal => {
            let children = node.children();
            let mut res = write!(buf, "{} {} {} {}", tag, node.parent(), node.count(), children[0]);
            for (key, child) in node.keys().iter().zip(&children[1..]) {
                res = res.and_then(|_| {
                    write!(buf, " {} {} {}", key.search_value, key.tie_break, child)
                });
            }
            res
        }
    };
    written.map_err(|e| CedarError::Internal(format!("node formatting failed: {}", e)))?;

    finish_line(buf, width)
}

/// Decodes a node line read from `address`.
///
/// `line` may include its trailing newline and padding. Any deviation from
/// the grammar, a count above `max_keys`, or unsorted keys fail with
/// `IndexCorrupted`.
pub fn decode_node(line: &[u8], address: Address, max_keys: usize) -> Result<Node> {
    let corrupt = |reason: String| CedarError::corrupted(address.get(), reason);

    let text = std::str::from_utf8(line).map_err(|e| corrupt(format!("invalid utf-8: {}", e)))?;
    let mut fields = Fields {
        tokens: text.split_ascii_whitespace(),
        address,
    };

    let tag = fields
        .tokens
        .next()
        .ok_or_else(|| corrupt("empty node line".to_string()))?;
    let kind = match tag.as_bytes() {
        [b] => NodeKind::from_tag(*b),
        _ => None,
    }
    .ok_or_else(|| corrupt(format!("unknown node tag '{}'", tag)))?;

    let parent = Address::new(fields.next_u64("parent")?);

    let node = match kind {
        NodeKind::Leaf => {
            let left = Address::new(fields.next_u64("left")?);
            let right = Address::new(fields.next_u64("right")?);
            let count = fields.next_count(max_keys)?;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(fields.next_key()?);
            }
            Node::leaf(address, parent, left, right, keys)
        }
        NodeKind::Internal => {
            let count = fields.next_count(max_keys)?;
            if count == 0 {
                return Err(corrupt("internal node without separators".to_string()));
            }
            let mut keys = Vec::with_capacity(count);
            let mut children = Vec::with_capacity(count + 1);
            children.push(fields.next_child()?);
            for _ in 0..count {
                keys.push(fields.next_key()?);
                children.push(fields.next_child()?);
            }
            Node::internal(address, parent, keys, children)
        }
    };

    if let Some(extra) = fields.tokens.next() {
        return Err(corrupt(format!("unexpected trailing field '{}'", extra)));
    }
    if node.keys().windows(2).any(|w| w[0] >= w[1]) {
        return Err(corrupt("keys not strictly increasing".to_string()));
    }

    Ok(node)
}

/// Encodes the header line of `width + 1` bytes.
pub fn encode_header(root: Address, depth: u32, width: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(width + 1);
    write!(buf, "{} {}", root, depth)
        .map_err(|e| CedarError::Internal(format!("header formatting failed: {}", e)))?;
    finish_line(buf, width)
}

/// Decodes the header line into `(root_address, depth)`.
pub fn decode_header(line: &[u8]) -> Result<(Address, u32)> {
    let text = std::str::from_utf8(line)
        .map_err(|e| CedarError::HeaderCorrupted(format!("invalid utf-8: {}", e)))?;
    let mut tokens = text.split_ascii_whitespace();

    let root = tokens
        .next()
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or_else(|| CedarError::HeaderCorrupted(format!("bad root field in '{}'", text.trim_end())))?;
    let depth = tokens
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or_else(|| CedarError::HeaderCorrupted(format!("bad depth field in '{}'", text.trim_end())))?;
    if tokens.next().is_some() {
        return Err(CedarError::HeaderCorrupted("trailing header fields".to_string()));
    }
    if root == 0 {
        return Err(CedarError::HeaderCorrupted("null root address".to_string()));
    }

    Ok((Address::new(root), depth))
}

/// Pads an encoded line to `width` and appends the newline.
fn finish_line(mut buf: BytesMut, width: usize) -> Result<Bytes> {
    if buf.len() > width {
        return Err(CedarError::LineOverflow {
            width,
            needed: buf.len(),
        });
    }
    buf.resize(width, b' ');
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Token cursor over one node line.
struct Fields<'a> {
    tokens: SplitAsciiWhitespace<'a>,
    address: Address,
}

impl Fields<'_> {
    fn next_u64(&mut self, field: &str) -> Result<u64> {
        let token = self.tokens.next().ok_or_else(|| {
            CedarError::corrupted(self.address.get(), format!("missing {} field", field))
        })?;
        token.parse::<u64>().map_err(|_| {
            CedarError::corrupted(
                self.address.get(),
                format!("non-numeric {} field '{}'", field, token),
            )
        })
    }

    fn next_count(&mut self, max_keys: usize) -> Result<usize> {
        let count = self.next_u64("count")?;
        if count > max_keys as u64 {
            return Err(CedarError::corrupted(
                self.address.get(),
                format!("count {} exceeds capacity {}", count, max_keys),
            ));
        }
        Ok(count as usize)
    }

    fn next_key(&mut self) -> Result<Key> {
        let search_value = self.next_u64("search value")?;
        let tie_break = self.next_u64("tie break")?;
        Ok(Key::new(search_value, tie_break))
    }

    fn next_child(&mut self) -> Result<Address> {
        let child = self.next_u64("child")?;
        if child == 0 {
            return Err(CedarError::corrupted(
                self.address.get(),
                "null child address".to_string(),
            ));
        }
        Ok(Address::new(child))
    }
}
