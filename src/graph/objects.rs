use super::{
    error::{GraphError, GraphErrorKind},
    params::{
        count, read_children, read_source, skip_base_params, skip_prop_bundle,
        skip_ranged_prop_bundle,
    },
    version::BankVersion,
    ActionKind, DecisionArgument, DecisionNode, DecisionTarget, DecisionTree, EventAction,
    GraphObject, MusicSwitch, MusicTrack,
};
use crate::read::{Endian, ReadResult, Reader};
use std::collections::VecDeque;

/// Object types that take part in event resolution. Every other type is skipped unread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ObjectType {
    Sound = 2,
    Action = 3,
    Event = 4,
    RandomContainer = 5,
    SwitchContainer = 6,
    MusicSegment = 10,
    MusicTrack = 11,
    MusicSwitch = 12,
    MusicPlaylist = 13,
}

pub(crate) static OBJECT_TYPES: phf::Map<u8, ObjectType> = phf::phf_map! {
    2u8 => ObjectType::Sound,
    3u8 => ObjectType::Action,
    4u8 => ObjectType::Event,
    5u8 => ObjectType::RandomContainer,
    6u8 => ObjectType::SwitchContainer,
    10u8 => ObjectType::MusicSegment,
    11u8 => ObjectType::MusicTrack,
    12u8 => ObjectType::MusicSwitch,
    13u8 => ObjectType::MusicPlaylist,
};

impl ObjectType {
    // records of these types have no base parameters, so their layout is stable across versions
    pub(crate) fn is_version_independent(self) -> bool {
        matches!(self, Self::Sound | Self::Action | Self::Event)
    }
}

const PLAY: u16 = 0x0403;
const SET_STATE: u16 = 0x1204;
const SET_SWITCH: u16 = 0x1901;

const SWITCH_TRACK: u32 = 3;

// grid period and offset, tempo, time signature and meter flag
const METER_INFO_SIZE: usize = 8 + 8 + 4 + 1 + 1 + 1;
const STINGER_SIZE: usize = 24;
const TREE_NODE_SIZE: u32 = 12;

pub(crate) fn decode(
    object_type: ObjectType,
    id: u32,
    reader: &mut Reader<'_>,
    version: BankVersion,
) -> Result<GraphObject, GraphError> {
    let body = GraphError::factory(GraphErrorKind::RecordBody {
        id,
        object_type: object_type as u8,
    });

    match object_type {
        ObjectType::Sound => read_source(reader, version)
            .map(|file_id| GraphObject::Sound { file_id })
            .map_err(body),
        ObjectType::Action => read_action(reader).map(GraphObject::Action).map_err(body),
        ObjectType::Event => read_event(reader, version)
            .map(|action_ids| GraphObject::Event { action_ids })
            .map_err(body),
        ObjectType::RandomContainer => read_random_container(reader, version)
            .map(|child_ids| GraphObject::RandomContainer { child_ids })
            .map_err(body),
        ObjectType::SwitchContainer => read_switch_container(reader, version)
            .map(|(group_id, child_ids)| GraphObject::SwitchContainer {
                group_id,
                child_ids,
            })
            .map_err(body),
        ObjectType::MusicSegment => read_music_node(reader, version)
            .map(|track_ids| GraphObject::MusicSegment { track_ids })
            .map_err(body),
        ObjectType::MusicTrack => read_music_track(reader, version)
            .map(GraphObject::MusicTrack)
            .map_err(body),
        ObjectType::MusicSwitch => {
            read_music_switch(id, reader, version).map(GraphObject::MusicSwitch)
        }
        ObjectType::MusicPlaylist => read_music_node(reader, version)
            .map(|track_ids| GraphObject::MusicPlaylist { track_ids })
            .map_err(body),
    }
}

fn read_action(reader: &mut Reader<'_>) -> ReadResult<EventAction> {
    let code = reader.u16()?;
    let target_id = reader.u32()?;
    let _is_bus = reader.u8()?;

    skip_prop_bundle(reader)?;
    skip_ranged_prop_bundle(reader)?;

    let mut action = EventAction {
        kind: ActionKind::Other(code),
        target_id,
        switch_group_id: None,
        switch_state_id: None,
        state_group_id: None,
        target_state_id: None,
    };

    match code {
        PLAY => action.kind = ActionKind::Play,
        SET_SWITCH => {
            action.kind = ActionKind::SetSwitch;
            action.switch_group_id = Some(reader.u32()?);
            action.switch_state_id = Some(reader.u32()?);
        }
        SET_STATE => {
            action.kind = ActionKind::SetState;
            action.state_group_id = Some(reader.u32()?);
            action.target_state_id = Some(reader.u32()?);
        }
        _ => {}
    }

    Ok(action)
}

fn read_event(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<Vec<u32>> {
    let len = if version.has_var_action_count() {
        reader.var_u32()?
    } else {
        reader.u32()?
    };

    (0..len).map(|_| reader.u32()).collect()
}

fn read_random_container(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<Vec<u32>> {
    skip_base_params(reader, version)?;

    // loop count and its modifiers, transition times, avoid-repeat count, three mode bytes
    reader.skip(2 * 3 + 4 * 3 + 2 + 3)?;
    reader.skip(if version.has_bit_vectors() { 1 } else { 5 })?;

    read_children(reader)
}

fn read_switch_container(
    reader: &mut Reader<'_>,
    version: BankVersion,
) -> ReadResult<(u32, Vec<u32>)> {
    skip_base_params(reader, version)?;

    reader.skip(if version.has_bit_vectors() { 1 } else { 4 })?;
    let group_id = reader.u32()?;
    // default switch and continuous validation flag
    reader.skip(4 + 1)?;

    Ok((group_id, read_children(reader)?))
}

// shared head of segments, playlists and switches; returns the child list
fn read_music_node(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<Vec<u32>> {
    if version.has_bit_vectors() {
        let _flags = reader.u8()?;
    }

    skip_base_params(reader, version)?;
    let children = read_children(reader)?;

    reader.skip(METER_INFO_SIZE)?;
    let stingers = count(reader.u32()?);
    reader.skip(stingers.saturating_mul(STINGER_SIZE))?;

    Ok(children)
}

fn read_music_track(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<MusicTrack> {
    if version.has_bit_vectors() {
        let _flags = reader.u8()?;
    }

    let source_count = reader.u32()?;
    let sources = (0..source_count)
        .map(|_| read_source(reader, version))
        .collect::<ReadResult<Vec<_>>>()?;

    let items = reader.u32()?;
    let mut files = Vec::new();
    for _ in 0..items {
        let track_index = reader.u32()?;
        let file_id = reader.u32()?;
        if version.has_playlist_cache_id() {
            let _cache_id = reader.u32()?;
        }
        // play position, trims and source duration
        reader.skip(4 * 8)?;

        files.push((track_index, file_id));
    }
    if items > 0 {
        let _sub_tracks = reader.u32()?;
    }

    if files.is_empty() {
        files = sources.into_iter().map(|file_id| (0, file_id)).collect();
    }

    let automations = reader.u32()?;
    for _ in 0..automations {
        // clip index and automation type
        reader.skip(8)?;
        let points = count(reader.u32()?);
        reader.skip(points.saturating_mul(12))?;
    }

    skip_base_params(reader, version)?;

    let track_type = if version.has_bit_vectors() {
        u32::from(reader.u8()?)
    } else {
        reader.u32()?
    };

    let mut track = MusicTrack {
        files,
        switch_group_id: None,
        switch_ids: Vec::new(),
    };

    if track_type == SWITCH_TRACK {
        let _group_type = reader.u8()?;
        track.switch_group_id = Some(reader.u32()?);
        let _default_switch = reader.u32()?;
        track.switch_ids = read_children(reader)?;
    }

    Ok(track)
}

fn read_music_switch(
    id: u32,
    reader: &mut Reader<'_>,
    version: BankVersion,
) -> Result<MusicSwitch, GraphError> {
    let body = GraphErrorKind::RecordBody {
        id,
        object_type: ObjectType::MusicSwitch as u8,
    };

    let child_ids = read_music_node(reader, version).map_err(GraphError::factory(body))?;
    let (arguments, raw_nodes) =
        read_switch_tail(reader, version).map_err(GraphError::factory(body))?;

    let depth = u32::try_from(arguments.len()).unwrap_or(u32::MAX);
    let tree = build_tree(id, depth, &raw_nodes, reader.endian())?;

    Ok(MusicSwitch {
        child_ids,
        arguments,
        tree,
    })
}

struct RawNode {
    key: u32,
    payload: [u8; 4],
    weight: u16,
    probability: u16,
}

fn read_switch_tail(
    reader: &mut Reader<'_>,
    version: BankVersion,
) -> ReadResult<(Vec<DecisionArgument>, Vec<RawNode>)> {
    skip_transition_rules(reader, version)?;

    let _continue_playback = reader.u8()?;

    let depth = reader.u32()?;
    let group_ids = (0..depth)
        .map(|_| reader.u32())
        .collect::<ReadResult<Vec<_>>>()?;

    let mut arguments = Vec::with_capacity(group_ids.len());
    for group_id in group_ids {
        arguments.push(DecisionArgument {
            group_id,
            group_type: reader.u8()?,
        });
    }

    let tree_size = reader.u32()?;
    let _mode = reader.u8()?;

    let mut nodes = Vec::new();
    for _ in 0..tree_size / TREE_NODE_SIZE {
        nodes.push(RawNode {
            key: reader.u32()?,
            payload: reader.take_const()?,
            weight: reader.u16()?,
            probability: reader.u16()?,
        });
    }

    Ok((arguments, nodes))
}

fn skip_transition_rules(reader: &mut Reader<'_>, version: BankVersion) -> ReadResult<()> {
    let rules = reader.u32()?;

    for _ in 0..rules {
        let sources = count(reader.u32()?);
        reader.skip(sources.saturating_mul(4))?;
        let destinations = count(reader.u32()?);
        reader.skip(destinations.saturating_mul(4))?;

        // source rule: fade, sync type, cue filter, post-exit flag
        reader.skip(21)?;
        // destination rule: fade, cue filter, jump target, entry type, pre-entry and cue flags
        reader.skip(if version.has_music_jump_type() { 26 } else { 24 })?;

        if reader.u8()? != 0 {
            // transition segment with its fade-in and fade-out and two flags
            reader.skip(4 + 12 + 12 + 2)?;
        }
    }

    Ok(())
}

// Nodes are stored breadth first. Whether a node's payload is a child range or an audio node
// depends only on its depth, so the tree is walked once from the root to classify every node.
// Children always follow their parent; a range starting at or before its parent is rejected.
fn build_tree(
    id: u32,
    depth: u32,
    raw: &[RawNode],
    endian: Endian,
) -> Result<DecisionTree, GraphError> {
    let mut targets = vec![None; raw.len()];
    let mut queue = VecDeque::new();
    if !raw.is_empty() {
        queue.push_back((0, 0));
    }

    while let Some((index, level)) = queue.pop_front() {
        if targets[index].is_some() {
            continue;
        }

        let target = if level < depth {
            let (first_child, child_count) = split_payload(raw[index].payload, endian);
            let end = usize::from(first_child) + usize::from(child_count);

            if end > raw.len() || (child_count > 0 && usize::from(first_child) <= index) {
                return Err(GraphError::new(GraphErrorKind::DecisionTree { id }));
            }

            queue.extend((usize::from(first_child)..end).map(|child| (child, level + 1)));
            DecisionTarget::Branch {
                first_child,
                child_count,
            }
        } else {
            DecisionTarget::Leaf {
                audio_node_id: payload_u32(raw[index].payload, endian),
            }
        };

        targets[index] = Some(target);
    }

    let nodes = raw
        .iter()
        .zip(targets)
        .map(|(node, target)| DecisionNode {
            key: node.key,
            target: target.unwrap_or(DecisionTarget::Leaf {
                audio_node_id: payload_u32(node.payload, endian),
            }),
            weight: node.weight,
            probability: node.probability,
        })
        .collect();

    Ok(DecisionTree { depth, nodes })
}

fn payload_u32(payload: [u8; 4], endian: Endian) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes(payload),
        Endian::Big => u32::from_be_bytes(payload),
    }
}

fn split_payload(payload: [u8; 4], endian: Endian) -> (u16, u16) {
    let [a, b, c, d] = payload;
    match endian {
        Endian::Little => (u16::from_le_bytes([a, b]), u16::from_le_bytes([c, d])),
        Endian::Big => (u16::from_be_bytes([a, b]), u16::from_be_bytes([c, d])),
    }
}
