//! Resolution of named events down to the audio blobs they can play.

use crate::error::{ErrorKind, Warning};
use crate::graph::{ActionKind, EventAction, GraphObject, MusicTrack, ObjectGraph};
use std::collections::{HashMap, HashSet};

/// Options for [`resolve_events`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum number of objects between an action and a sound before a path is abandoned.
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

/// One way a named event reaches an audio blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventMapping {
    /// The event name.
    pub name: String,
    /// ID of the audio blob.
    pub file_id: u32,
    /// Nearest enclosing container with more than one child, used to group sibling sounds.
    pub container_id: Option<u32>,
    /// The switch value selecting this blob on set-switch and set-state paths, or the enclosing
    /// switch's own ID on play paths through a switch.
    pub switch_id: Option<u32>,
    /// The music segment the blob plays in, if any.
    pub music_segment_id: Option<u32>,
}

/// The result of [`resolve_events`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    mappings: Vec<EventMapping>,
    warnings: Vec<Warning>,
}

impl Resolution {
    /// Returns every mapping found, grouped by event in input order.
    #[must_use]
    pub fn mappings(&self) -> &[EventMapping] {
        &self.mappings
    }

    /// Consumes the result, returning the mappings.
    #[must_use]
    pub fn into_mappings(self) -> Vec<EventMapping> {
        self.mappings
    }

    /// Returns the problems met while walking the graph: missing events, dangling references,
    /// cycles and paths cut off by the depth bound.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
struct Context {
    container_id: Option<u32>,
    switch_id: Option<u32>,
    music_segment_id: Option<u32>,
}

impl Context {
    // a container with a single child does not group anything, so the parent's context carries on
    fn enter_container(self, id: u32, children: usize) -> Self {
        if children > 1 {
            Self {
                container_id: Some(id),
                ..self
            }
        } else {
            self
        }
    }

    fn enter_switch(self, id: u32, children: usize) -> Self {
        if children > 1 {
            Self {
                container_id: Some(id),
                switch_id: Some(id),
                ..self
            }
        } else {
            self
        }
    }
}

struct Resolver<'graph, 'name> {
    graph: &'graph ObjectGraph,
    options: &'graph ResolveOptions,
    name: &'name str,
    // objects on the current path, for cycle detection
    path: Vec<u32>,
    // shallowest depth each object was walked at under a given context
    visited: HashMap<(u32, Context), usize>,
    emitted: HashSet<(u32, Context)>,
    mappings: Vec<EventMapping>,
    warnings: Vec<Warning>,
}

/// Resolves `(name, hash)` pairs against an object graph.
///
/// Each hash is looked up as an event ID. Play actions are followed through containers, switches
/// and music structures down to sounds and music tracks; set-switch and set-state actions yield
/// the blobs selected by the value they set. Missing objects, cycles and overly deep paths are
/// reported as warnings and never abort the walk.
pub fn resolve_events<S: AsRef<str>>(
    names: &[(S, u32)],
    graph: &ObjectGraph,
    options: &ResolveOptions,
) -> Resolution {
    let mut resolution = Resolution::default();

    for (name, hash) in names {
        let mut resolver = Resolver {
            graph,
            options,
            name: name.as_ref(),
            path: Vec::new(),
            visited: HashMap::new(),
            emitted: HashSet::new(),
            mappings: Vec::new(),
            warnings: Vec::new(),
        };
        resolver.resolve_event(*hash);

        log::debug!(
            "event {:?} resolved to {} blobs",
            name.as_ref(),
            resolver.mappings.len()
        );

        resolution.mappings.append(&mut resolver.mappings);
        resolution.warnings.append(&mut resolver.warnings);
    }

    resolution
}

impl Resolver<'_, '_> {
    fn resolve_event(&mut self, hash: u32) {
        let action_ids = match self.graph.get(hash) {
            Some(GraphObject::Event { action_ids }) => action_ids,
            Some(_) => {
                self.warn(hash, ErrorKind::UnknownFormat, "is not an event");
                return;
            }
            None => {
                self.warn(hash, ErrorKind::OutOfRangeReference, "has no event in the bank");
                return;
            }
        };

        for &action_id in action_ids {
            match self.graph.get(action_id) {
                Some(GraphObject::Action(action)) => self.resolve_action(action),
                _ => self.warn(
                    action_id,
                    ErrorKind::OutOfRangeReference,
                    "refers to a missing action",
                ),
            }
        }
    }

    fn resolve_action(&mut self, action: &EventAction) {
        match action.kind {
            ActionKind::Play => self.walk(action.target_id, Context::default()),
            ActionKind::SetSwitch => {
                if let (Some(group), Some(value)) =
                    (action.switch_group_id, action.switch_state_id)
                {
                    self.resolve_selection(group, value);
                }
            }
            ActionKind::SetState => {
                if let (Some(group), Some(value)) =
                    (action.state_group_id, action.target_state_id)
                {
                    self.resolve_selection(group, value);
                }
            }
            ActionKind::Other(code) => log::debug!("ignoring action of type 0x{code:04x}"),
        }
    }

    // Setting a group value plays whatever that value selects in every music structure
    // switching on the group.
    fn resolve_selection(&mut self, group: u32, value: u32) {
        let graph = self.graph;
        let context = Context {
            switch_id: Some(value),
            ..Context::default()
        };

        for (id, object) in graph.iter() {
            match object {
                GraphObject::MusicTrack(track) if track.switch_group_id == Some(group) => {
                    for (index, &switch_id) in (0u32..).zip(&track.switch_ids) {
                        if switch_id == value {
                            self.emit_track(track, Some(index), context);
                        }
                    }
                }
                GraphObject::MusicSwitch(switch) => {
                    let Some(level) = switch
                        .arguments
                        .iter()
                        .position(|argument| argument.group_id == group)
                    else {
                        continue;
                    };

                    let context = Context {
                        container_id: Some(id),
                        ..context
                    };

                    for (keys, audio_node_id) in switch.tree.leaves() {
                        if keys.get(level) == Some(&value) {
                            self.path.push(id);
                            self.walk(audio_node_id, context);
                            self.path.clear();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn walk(&mut self, id: u32, context: Context) {
        if self.path.len() >= self.options.max_depth {
            self.warn(id, ErrorKind::OutOfRangeReference, "lies beyond the maximum depth");
            return;
        }
        if self.path.contains(&id) {
            self.warn(id, ErrorKind::OutOfRangeReference, "is part of a reference cycle");
            return;
        }

        // shared children are walked again only when reached closer to the root
        let depth = self.path.len();
        if self
            .visited
            .get(&(id, context))
            .is_some_and(|&seen| seen <= depth)
        {
            return;
        }
        let _previous = self.visited.insert((id, context), depth);

        let graph = self.graph;
        let Some(object) = graph.get(id) else {
            self.warn(id, ErrorKind::OutOfRangeReference, "is referenced but not in the bank");
            return;
        };

        self.path.push(id);

        match object {
            GraphObject::Sound { file_id } => self.emit(*file_id, context),
            GraphObject::RandomContainer { child_ids } => {
                self.walk_all(child_ids, context.enter_container(id, child_ids.len()));
            }
            GraphObject::SwitchContainer { child_ids, .. } => {
                self.walk_all(child_ids, context.enter_switch(id, child_ids.len()));
            }
            GraphObject::MusicPlaylist { track_ids } => {
                self.walk_all(track_ids, context.enter_container(id, track_ids.len()));
            }
            GraphObject::MusicSegment { track_ids } => {
                let context = Context {
                    music_segment_id: Some(id),
                    ..context
                };
                self.walk_all(track_ids, context);
            }
            GraphObject::MusicTrack(track) => self.emit_track(track, None, context),
            GraphObject::MusicSwitch(switch) => {
                let mut targets: Vec<u32> = switch
                    .tree
                    .leaves()
                    .into_iter()
                    .map(|(_, audio_node_id)| audio_node_id)
                    .collect();
                if targets.is_empty() {
                    targets.clone_from(&switch.child_ids);
                }
                dedup_in_order(&mut targets);

                self.walk_all(&targets, context.enter_switch(id, targets.len()));
            }
            GraphObject::Event { .. } | GraphObject::Action(_) => {
                self.warn(id, ErrorKind::UnknownFormat, "cannot be played");
            }
        }

        self.path.truncate(self.path.len() - 1);
    }

    fn walk_all(&mut self, ids: &[u32], context: Context) {
        for &child in ids {
            self.walk(child, context);
        }
    }

    // one mapping per distinct file, optionally limited to one sub-track
    fn emit_track(&mut self, track: &MusicTrack, sub_track: Option<u32>, context: Context) {
        let mut files: Vec<u32> = track
            .files
            .iter()
            .filter(|(index, _)| sub_track.map_or(true, |sub_track| *index == sub_track))
            .map(|&(_, file_id)| file_id)
            .collect();
        dedup_in_order(&mut files);

        for file_id in files {
            self.emit(file_id, context);
        }
    }

    fn emit(&mut self, file_id: u32, context: Context) {
        if !self.emitted.insert((file_id, context)) {
            return;
        }

        self.mappings.push(EventMapping {
            name: self.name.to_owned(),
            file_id,
            container_id: context.container_id,
            switch_id: context.switch_id,
            music_segment_id: context.music_segment_id,
        });
    }

    fn warn(&mut self, id: u32, kind: ErrorKind, problem: &str) {
        self.warnings.push(Warning::new(
            kind,
            id as usize,
            format!("event {:?}: object {id} {problem}", self.name),
        ));
    }
}

fn dedup_in_order(ids: &mut Vec<u32>) {
    let mut seen = Vec::with_capacity(ids.len());
    ids.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });
}
