pub(crate) mod error;
mod objects;
mod params;
pub(crate) mod version;

use crate::error::{ErrorKind, Warning};
use crate::read::{Endian, ReadResult, Reader};
use error::{GraphError, GraphErrorKind};
use objects::OBJECT_TYPES;
use std::collections::BTreeMap;
pub use version::BankVersion;

/// The typed object directory of a bank: every record that can lead from an event to audio.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectGraph {
    objects: BTreeMap<u32, GraphObject>,
    warnings: Vec<Warning>,
}

impl ObjectGraph {
    /// Decodes an object directory chunk payload.
    ///
    /// Records of types that play no part in event resolution are skipped. A record that fails to
    /// decode is dropped with a warning; the records around it are unaffected.
    ///
    /// # Errors
    ///
    /// Fails only if the object count itself cannot be read.
    pub fn parse(data: &[u8], version: BankVersion, endian: Endian) -> Result<Self, GraphError> {
        let mut reader = Reader::with_endian(data, endian);
        let count = reader
            .u32()
            .map_err(GraphError::factory(GraphErrorKind::ObjectCount))?;

        let mut graph = Self::default();

        if !version.is_supported() {
            graph.warnings.push(Warning::new(
                ErrorKind::UnsupportedVersion,
                0,
                format!(
                    "bank version {version} is outside the known range, decoding what is possible"
                ),
            ));
        }

        let mut skipped = 0u32;

        for index in 0..count {
            let start = reader.position();

            let (object_type, body) = match read_record(&mut reader) {
                Ok(record) => record,
                Err(e) => {
                    graph.report(start, &GraphError::new_with_source(
                        GraphErrorKind::RecordHeader { index },
                        e,
                    ));
                    break;
                }
            };

            let Some(&kind) = OBJECT_TYPES.get(&object_type) else {
                skipped += 1;
                continue;
            };

            let mut record = Reader::with_endian(body, endian);
            let Ok(id) = record.u32() else {
                graph.report(start, &GraphError::new(GraphErrorKind::RecordHeader { index }));
                continue;
            };

            if !version.has_known_base_params() && !kind.is_version_independent() {
                graph.report(start, &GraphError::new(GraphErrorKind::UnsupportedRecord {
                    id,
                    object_type,
                    version: version.get(),
                }));
                continue;
            }

            match objects::decode(kind, id, &mut record, version) {
                Ok(object) => {
                    if graph.objects.insert(id, object).is_some() {
                        graph.warnings.push(Warning::new(
                            ErrorKind::OutOfRangeReference,
                            start,
                            format!("object {id} appears more than once, keeping the last record"),
                        ));
                    }
                }
                Err(e) => graph.report(start, &e),
            }
        }

        log::debug!(
            "decoded {} of {count} directory records ({skipped} of other types)",
            graph.objects.len()
        );

        Ok(graph)
    }

    fn report(&mut self, position: usize, error: &GraphError) {
        self.warnings
            .push(Warning::new(error.kind(), position, error.to_string()));
    }

    /// Returns the object with the given ID.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&GraphObject> {
        self.objects.get(&id)
    }

    /// Iterates over all objects in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &GraphObject)> {
        self.objects.iter().map(|(&id, object)| (id, object))
    }

    /// Returns the number of decoded objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns whether no objects were decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns the problems met while decoding, including records that were dropped.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    #[cfg(test)]
    pub(crate) fn from_objects(objects: impl IntoIterator<Item = (u32, GraphObject)>) -> Self {
        Self {
            objects: objects.into_iter().collect(),
            warnings: Vec::new(),
        }
    }
}

fn read_record<'data>(reader: &mut Reader<'data>) -> ReadResult<(u8, &'data [u8])> {
    let object_type = reader.u8()?;
    let len = reader.u32()?;
    // the body is taken whole, so the next record starts exactly at its end
    let body = reader.take(params::count(len))?;
    Ok((object_type, body))
}

/// One decoded record of the object directory.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphObject {
    /// A sound that plays one piece of media.
    Sound {
        /// ID of the audio blob.
        file_id: u32,
    },
    /// A single action triggered by an event.
    Action(EventAction),
    /// A named event, whose ID is the hash of its name.
    Event {
        /// IDs of the actions the event runs, in order.
        action_ids: Vec<u32>,
    },
    /// A random or sequence container.
    RandomContainer {
        /// IDs of the contained nodes.
        child_ids: Vec<u32>,
    },
    /// A container choosing among its children by a switch or state group.
    SwitchContainer {
        /// ID of the switch or state group.
        group_id: u32,
        /// IDs of the contained nodes.
        child_ids: Vec<u32>,
    },
    /// A music segment.
    MusicSegment {
        /// IDs of the segment's tracks.
        track_ids: Vec<u32>,
    },
    /// A music track.
    MusicTrack(MusicTrack),
    /// An interactive music switch.
    MusicSwitch(MusicSwitch),
    /// A music playlist.
    MusicPlaylist {
        /// IDs of the playlist's children (usually segments).
        track_ids: Vec<u32>,
    },
}

/// What an action does when its event fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Start playback of the target.
    Play,
    /// Set a switch group to a value.
    SetSwitch,
    /// Set a state group to a value.
    SetState,
    /// Any other action, with its raw type code.
    Other(u16),
}

/// An action record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventAction {
    /// The kind of action.
    pub kind: ActionKind,
    /// ID of the object the action applies to.
    pub target_id: u32,
    /// Switch group of a set-switch action.
    pub switch_group_id: Option<u32>,
    /// Switch value of a set-switch action.
    pub switch_state_id: Option<u32>,
    /// State group of a set-state action.
    pub state_group_id: Option<u32>,
    /// State value of a set-state action.
    pub target_state_id: Option<u32>,
}

/// A music track record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MusicTrack {
    /// `(sub-track index, file ID)` pairs from the track's playlist.
    pub files: Vec<(u32, u32)>,
    /// Switch group selecting the sub-track, for switch tracks.
    pub switch_group_id: Option<u32>,
    /// Switch value for each sub-track, by sub-track index.
    pub switch_ids: Vec<u32>,
}

/// An interactive music switch record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MusicSwitch {
    /// IDs of the switch's children.
    pub child_ids: Vec<u32>,
    /// The groups the decision tree switches on, outermost first.
    pub arguments: Vec<DecisionArgument>,
    /// The decision tree mapping group values to children.
    pub tree: DecisionTree,
}

/// One level of a decision tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecisionArgument {
    /// ID of the switch or state group.
    pub group_id: u32,
    /// Whether the group is a switch group (0) or a state group (1).
    pub group_type: u8,
}

/// The decision tree of a music switch, stored as a flat breadth-first node list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecisionTree {
    depth: u32,
    nodes: Vec<DecisionNode>,
}

impl DecisionTree {
    /// Returns the number of arguments; leaves sit at this depth below the root.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns all nodes, root first.
    #[must_use]
    pub fn nodes(&self) -> &[DecisionNode] {
        &self.nodes
    }

    /// Lists every leaf reachable from the root as the keys on the path to it (one per argument,
    /// outermost first) and the audio node it selects.
    ///
    /// Every node is visited at most once, so child ranges that overlap or point backwards cannot
    /// make the walk grow past the size of the node list.
    #[must_use]
    pub fn leaves(&self) -> Vec<(Vec<u32>, u32)> {
        let mut leaves = Vec::new();
        if !self.nodes.is_empty() {
            let mut visited = vec![false; self.nodes.len()];
            self.collect_leaves(0, 0, &mut Vec::new(), &mut visited, &mut leaves);
        }
        leaves
    }

    fn collect_leaves(
        &self,
        index: usize,
        level: u32,
        keys: &mut Vec<u32>,
        visited: &mut [bool],
        leaves: &mut Vec<(Vec<u32>, u32)>,
    ) {
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        if std::mem::replace(&mut visited[index], true) {
            return;
        }

        match node.target {
            DecisionTarget::Leaf { audio_node_id } => leaves.push((keys.clone(), audio_node_id)),
            DecisionTarget::Branch {
                first_child,
                child_count,
            } if level < self.depth => {
                let first = usize::from(first_child);

                for child in first..first + usize::from(child_count) {
                    let Some(child_node) = self.nodes.get(child) else {
                        break;
                    };

                    keys.push(child_node.key);
                    self.collect_leaves(child, level + 1, keys, visited, leaves);
                    keys.truncate(keys.len() - 1);
                }
            }
            DecisionTarget::Branch { .. } => {}
        }
    }
}

#[cfg(test)]
impl DecisionTree {
    pub(crate) fn from_nodes(depth: u32, nodes: Vec<DecisionNode>) -> Self {
        Self { depth, nodes }
    }
}

/// One node of a decision tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecisionNode {
    /// The group value this node matches (0 matches any value).
    pub key: u32,
    /// Where the node leads.
    pub target: DecisionTarget,
    /// Selection weight among siblings with the same key.
    pub weight: u16,
    /// Selection probability among siblings with the same key.
    pub probability: u16,
}

/// The payload of a decision tree node, which depends on its depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionTarget {
    /// An inner node and the range of its children in the node list.
    Branch {
        /// Index of the first child.
        first_child: u16,
        /// Number of children.
        child_count: u16,
    },
    /// A leaf selecting an audio node.
    Leaf {
        /// ID of the selected child of the music switch.
        audio_node_id: u32,
    },
}

#[cfg(test)]
mod test {
    use super::{
        error::GraphErrorKind, params::fixture::empty_base_params, BankVersion, DecisionNode,
        DecisionTarget, DecisionTree, GraphObject, ObjectGraph,
    };
    use crate::error::ErrorKind;
    use crate::read::Endian;

    fn record(object_type: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![object_type];
        bytes.extend_from_slice(&u32::try_from(body.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    fn sound(id: u32, file_id: u32) -> Vec<u8> {
        let mut body = id.to_le_bytes().to_vec();
        body.extend_from_slice(&0x0004_0001u32.to_le_bytes());
        body.push(0);
        body.extend_from_slice(&file_id.to_le_bytes());
        body.extend_from_slice(&[0; 5]);
        // base parameters follow, but they are never read
        body.extend(empty_base_params(134));
        record(2, &body)
    }

    fn directory(records: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = u32::try_from(records.len()).unwrap().to_le_bytes().to_vec();
        for record in records {
            bytes.extend_from_slice(record);
        }
        bytes
    }

    #[test]
    fn parse_directory() {
        let mut event = 3u32.to_le_bytes().to_vec();
        event.extend_from_slice(&[1]);
        event.extend_from_slice(&7u32.to_le_bytes());

        let data = directory(&[
            sound(1, 100),
            record(14, &[0xAA; 9]),
            record(4, &event),
            sound(2, 200),
        ]);
        let graph = ObjectGraph::parse(&data, BankVersion::new(134), Endian::Little).unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.warnings().is_empty());
        assert_eq!(graph.get(2), Some(&GraphObject::Sound { file_id: 200 }));
        assert_eq!(
            graph.get(3),
            Some(&GraphObject::Event {
                action_ids: vec![7]
            })
        );
        let ids: Vec<_> = graph.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn keep_records_around_damaged_ones() {
        let data = directory(&[sound(1, 100), record(3, &[5, 0, 0, 0, 0x03]), sound(2, 200)]);
        let graph = ObjectGraph::parse(&data, BankVersion::new(134), Endian::Little).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.warnings().len(), 1);
        assert_eq!(graph.warnings()[0].kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn stop_at_truncated_record() {
        let mut data = directory(&[sound(1, 100), sound(2, 200)]);
        data.truncate(data.len() - 3);
        let graph = ObjectGraph::parse(&data, BankVersion::new(134), Endian::Little).unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.warnings().len(), 1);
    }

    #[test]
    fn decode_what_old_versions_allow() {
        let mut container = 9u32.to_le_bytes().to_vec();
        container.extend_from_slice(&[0; 40]);
        let mut old_sound = 1u32.to_le_bytes().to_vec();
        old_sound.extend_from_slice(&0x0004_0001u32.to_le_bytes());
        old_sound.extend_from_slice(&2u32.to_le_bytes());
        old_sound.extend_from_slice(&5u32.to_le_bytes());
        old_sound.extend_from_slice(&6u32.to_le_bytes());
        old_sound.push(0);

        let data = directory(&[record(2, &old_sound), record(5, &container)]);
        let graph = ObjectGraph::parse(&data, BankVersion::new(72), Endian::Little).unwrap();

        assert_eq!(graph.get(1), Some(&GraphObject::Sound { file_id: 6 }));
        assert!(graph.get(9).is_none());
        let kinds: Vec<_> = graph.warnings().iter().map(|w| w.kind()).collect();
        assert_eq!(
            kinds,
            [ErrorKind::UnsupportedVersion, ErrorKind::UnsupportedVersion]
        );
    }

    #[test]
    fn parse_big_endian_directory() {
        let mut body = 4u32.to_be_bytes().to_vec();
        body.extend_from_slice(&0x0004_0001u32.to_be_bytes());
        body.push(0);
        body.extend_from_slice(&321u32.to_be_bytes());
        body.extend_from_slice(&[0; 5]);
        let mut data = 1u32.to_be_bytes().to_vec();
        data.push(2);
        data.extend_from_slice(&u32::try_from(body.len()).unwrap().to_be_bytes());
        data.extend(body);

        let graph = ObjectGraph::parse(&data, BankVersion::new(134), Endian::Big).unwrap();
        assert_eq!(graph.get(4), Some(&GraphObject::Sound { file_id: 321 }));
    }

    #[test]
    fn reject_missing_count() {
        assert!(ObjectGraph::parse(&[1, 0], BankVersion::new(134), Endian::Little)
            .is_err_and(|e| e.kind() == ErrorKind::OutOfBounds
                && e.detail() == GraphErrorKind::ObjectCount));
    }

    fn branch(key: u32, first_child: u16, child_count: u16) -> DecisionNode {
        DecisionNode {
            key,
            target: DecisionTarget::Branch {
                first_child,
                child_count,
            },
            weight: 50,
            probability: 100,
        }
    }

    #[test]
    fn visit_tree_nodes_once() {
        let looping = DecisionTree::from_nodes(40, vec![branch(0, 0, 2), branch(1, 0, 2)]);
        assert!(looping.leaves().is_empty());

        // every branch shares a child with its neighbour
        let mut nodes: Vec<DecisionNode> = (1u16..60)
            .map(|index| branch(u32::from(index), index + 1, 2))
            .collect();
        nodes.insert(0, branch(0, 1, 2));
        nodes.push(DecisionNode {
            key: 99,
            target: DecisionTarget::Leaf { audio_node_id: 7 },
            weight: 50,
            probability: 100,
        });
        let shared = DecisionTree::from_nodes(u32::MAX, nodes);

        let leaves = shared.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].1, 7);
    }
}
