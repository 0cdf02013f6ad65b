use std::collections::HashMap;

use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("pattern for {new_mime:?} is a prefix of an existing pattern already terminating as {existing_mime:?}")]
    PrefixCollision { existing_mime: &'static str, new_mime: &'static str },

    #[error("node already has {existing:?} children; cannot add a {attempted:?} child")]
    MixedChildKinds { existing: &'static str, attempted: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternByte {
    Literal(u8),
    Any,
}

#[derive(Default)]
enum Children {
    #[default]
    Empty,
    Literal(HashMap<u8, Node>),
    Wildcard(Box<Node>),
}

#[derive(Default)]
pub(crate) struct Node {
    mime: Option<&'static str>,
    children: Children,
}

impl Node {
    pub fn insert(&mut self, pattern: &[PatternByte], mime: &'static str) -> Result<()> {
        match pattern.split_first() {
            None => {
                self.mime = Some(mime);
                Ok(())
            }
            Some((head, rest)) => {
                if let Some(existing) = self.mime {
                    if existing != mime {
                        return Err(Error::PrefixCollision { existing_mime: existing, new_mime: mime });
                    }
                }

                match head {
                    PatternByte::Any => {
                        let child = match &mut self.children {
                            Children::Empty => {
                                self.children = Children::Wildcard(Box::new(Node::default()));
                                match &mut self.children {
                                    Children::Wildcard(n) => n,
                                    _ => unreachable!(),
                                }
                            }
                            Children::Wildcard(n) => n,
                            Children::Literal(_) => {
                                return Err(Error::MixedChildKinds { existing: "literal", attempted: "wildcard" })
                            }
                        };

                        child.insert(rest, mime)
                    }
                    PatternByte::Literal(byte) => {
                        let map = match &mut self.children {
                            Children::Empty => {
                                self.children = Children::Literal(HashMap::new());
                                match &mut self.children {
                                    Children::Literal(m) => m,
                                    _ => unreachable!(),
                                }
                            }
                            Children::Literal(m) => m,
                            Children::Wildcard(_) => {
                                return Err(Error::MixedChildKinds { existing: "wildcard", attempted: "literal" })
                            }
                        };

                        map.entry(*byte).or_default().insert(rest, mime)
                    }
                }
            }
        }
    }

    pub fn lookup(&self, data: &[u8]) -> Option<&'static str> {
        if let Some(mime) = self.mime {
            return Some(mime);
        }

        let (&byte, rest) = data.split_first()?;

        match &self.children {
            Children::Empty => None,
            Children::Wildcard(child) => child.lookup(rest),
            Children::Literal(map) => map.get(&byte).and_then(|child| child.lookup(rest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(bytes: &[u8]) -> Vec<PatternByte> {
        bytes.iter().map(|&b| PatternByte::Literal(b)).collect()
    }

    #[test]
    fn rejects_mixed_child_kinds() {
        let mut root = Node::default();
        root.insert(&lit(b"AB"), "a/b").unwrap();

        let wildcard_pattern = [PatternByte::Literal(b'A'), PatternByte::Any];
        assert!(root.insert(&wildcard_pattern, "a/c").is_err());
    }

    #[test]
    fn rejects_prefix_collision_across_mimes() {
        let mut root = Node::default();
        root.insert(&lit(b"AB"), "a/b").unwrap();
        assert!(root.insert(&lit(b"ABC"), "a/c").is_err());
    }

    #[test]
    fn allows_same_mime_prefix_extension() {
        let mut root = Node::default();
        root.insert(&lit(b"AB"), "a/b").unwrap();
        assert!(root.insert(&lit(b"ABC"), "a/b").is_ok());
    }
}
