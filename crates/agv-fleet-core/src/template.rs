//! Mutable drafts of the next outbound command.
//!
//! A template is owned by exactly one builder. Entries are addressed by
//! position; an out-of-range position is reported and leaves the template
//! unchanged. Seeded entries are constructed fresh for every template.

use agv_fleet_proto::{
    Action, ActionParameter, BlockingType, Category, ControlPoint, Edge, Header, InstantActions,
    Node, NodePosition, Order, Trajectory,
};
use serde::Serialize;
use std::fmt;

/// A draft that can be rendered into a complete message.
pub trait CommandTemplate {
    /// Category of the rendered message.
    const CATEGORY: Category;

    /// Rendered message type.
    type Message: Serialize;

    /// Snapshot the draft under `header`.
    fn render(&self, header: Header) -> Self::Message;
}

/// Kind of entry addressed by an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Order node
    Node,
    /// Order edge
    Edge,
    /// Instant action
    Action,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Action => "action",
        })
    }
}

/// Errors for template mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Index outside the entry list
    #[error("{kind} index {index} is out of range (len {len})")]
    IndexOutOfRange {
        /// Addressed list
        kind: EntryKind,
        /// Requested index
        index: usize,
        /// List length at the time of the request
        len: usize,
    },
}

fn entry_mut<T>(items: &mut [T], kind: EntryKind, index: usize) -> Result<&mut T, TemplateError> {
    let len = items.len();
    items
        .get_mut(index)
        .ok_or(TemplateError::IndexOutOfRange { kind, index, len })
}

fn remove_at<T>(items: &mut Vec<T>, kind: EntryKind, index: usize) -> Result<T, TemplateError> {
    if index < items.len() {
        Ok(items.remove(index))
    } else {
        Err(TemplateError::IndexOutOfRange {
            kind,
            index,
            len: items.len(),
        })
    }
}

/// Partial update of a node; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    /// Replacement `node_id`
    pub node_id: Option<String>,
    /// Replacement `sequence_id`
    pub sequence_id: Option<u32>,
    /// Replacement `node_description`
    pub node_description: Option<String>,
    /// Replacement `released`
    pub released: Option<bool>,
    /// Replacement `node_position`
    pub node_position: Option<NodePosition>,
    /// Replacement `actions`
    pub actions: Option<Vec<Action>>,
}

impl NodeUpdate {
    fn apply(self, node: &mut Node) {
        if let Some(node_id) = self.node_id {
            node.node_id = node_id;
        }
        if let Some(sequence_id) = self.sequence_id {
            node.sequence_id = sequence_id;
        }
        if let Some(description) = self.node_description {
            node.node_description = Some(description);
        }
        if let Some(released) = self.released {
            node.released = released;
        }
        if let Some(position) = self.node_position {
            node.node_position = Some(position);
        }
        if let Some(actions) = self.actions {
            node.actions = actions;
        }
    }
}

/// Partial update of an edge; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeUpdate {
    /// Replacement `edge_id`
    pub edge_id: Option<String>,
    /// Replacement `sequence_id`
    pub sequence_id: Option<u32>,
    /// Replacement `edge_description`
    pub edge_description: Option<String>,
    /// Replacement `released`
    pub released: Option<bool>,
    /// Replacement `start_node_id`
    pub start_node_id: Option<String>,
    /// Replacement `end_node_id`
    pub end_node_id: Option<String>,
    /// Replacement `max_speed`
    pub max_speed: Option<f64>,
    /// Replacement `max_height`
    pub max_height: Option<f64>,
    /// Replacement `min_height`
    pub min_height: Option<f64>,
    /// Replacement `orientation`
    pub orientation: Option<f64>,
    /// Replacement `direction`
    pub direction: Option<String>,
    /// Replacement `rotation_allowed`
    pub rotation_allowed: Option<bool>,
    /// Replacement `max_rotation_speed`
    pub max_rotation_speed: Option<f64>,
    /// Replacement `length`
    pub length: Option<f64>,
    /// Replacement `trajectory`
    pub trajectory: Option<Trajectory>,
    /// Replacement `actions`
    pub actions: Option<Vec<Action>>,
}

impl EdgeUpdate {
    fn apply(self, edge: &mut Edge) {
        if let Some(edge_id) = self.edge_id {
            edge.edge_id = edge_id;
        }
        if let Some(sequence_id) = self.sequence_id {
            edge.sequence_id = sequence_id;
        }
        if let Some(description) = self.edge_description {
            edge.edge_description = Some(description);
        }
        if let Some(released) = self.released {
            edge.released = released;
        }
        if let Some(start) = self.start_node_id {
            edge.start_node_id = start;
        }
        if let Some(end) = self.end_node_id {
            edge.end_node_id = end;
        }
        if let Some(actions) = self.actions {
            edge.actions = actions;
        }
        edge.max_speed = self.max_speed.or(edge.max_speed);
        edge.max_height = self.max_height.or(edge.max_height);
        edge.min_height = self.min_height.or(edge.min_height);
        edge.orientation = self.orientation.or(edge.orientation);
        edge.direction = self.direction.or(edge.direction.take());
        edge.rotation_allowed = self.rotation_allowed.or(edge.rotation_allowed);
        edge.max_rotation_speed = self.max_rotation_speed.or(edge.max_rotation_speed);
        edge.length = self.length.or(edge.length);
        edge.trajectory = self.trajectory.or(edge.trajectory.take());
    }
}

/// Partial update of an action; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionUpdate {
    /// Replacement `action_type`
    pub action_type: Option<String>,
    /// Replacement `action_id`
    pub action_id: Option<String>,
    /// Replacement `action_description`
    pub action_description: Option<String>,
    /// Replacement `blocking_type`
    pub blocking_type: Option<BlockingType>,
    /// Replacement `action_parameters`
    pub action_parameters: Option<Vec<ActionParameter>>,
}

impl ActionUpdate {
    fn apply(self, action: &mut Action) {
        if let Some(action_type) = self.action_type {
            action.action_type = action_type;
        }
        if let Some(action_id) = self.action_id {
            action.action_id = action_id;
        }
        if let Some(description) = self.action_description {
            action.action_description = Some(description);
        }
        if let Some(blocking_type) = self.blocking_type {
            action.blocking_type = blocking_type;
        }
        if let Some(parameters) = self.action_parameters {
            action.action_parameters = parameters;
        }
    }
}

/// Draft of the next order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTemplate {
    order_id: String,
    order_update_id: u32,
    zone_set_id: Option<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl OrderTemplate {
    /// Empty draft for `order_id`.
    #[must_use]
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            order_update_id: 0,
            zone_set_id: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Draft seeded with an example node and edge.
    #[must_use]
    pub fn seeded() -> Self {
        let mut template = Self::new("order_001");
        template.zone_set_id = Some("zone_set_001".to_string());
        template.nodes.push(seed_node());
        template.edges.push(seed_edge());
        template
    }

    /// Nodes in traversal order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in traversal order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Order identifier.
    #[must_use]
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Order update counter.
    #[must_use]
    pub fn order_update_id(&self) -> u32 {
        self.order_update_id
    }

    /// Start a new order or a new update of the current one.
    pub fn set_order(&mut self, order_id: impl Into<String>, order_update_id: u32) {
        self.order_id = order_id.into();
        self.order_update_id = order_update_id;
    }

    /// Replace the zone set.
    pub fn set_zone_set_id(&mut self, zone_set_id: Option<String>) {
        self.zone_set_id = zone_set_id;
    }

    /// Append a node.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Update the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_node(&mut self, index: usize, update: NodeUpdate) -> Result<(), TemplateError> {
        update.apply(entry_mut(&mut self.nodes, EntryKind::Node, index)?);
        Ok(())
    }

    /// Remove the node at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_node(&mut self, index: usize) -> Result<Node, TemplateError> {
        remove_at(&mut self.nodes, EntryKind::Node, index)
    }

    /// Append an edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Update the edge at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_edge(&mut self, index: usize, update: EdgeUpdate) -> Result<(), TemplateError> {
        update.apply(entry_mut(&mut self.edges, EntryKind::Edge, index)?);
        Ok(())
    }

    /// Remove the edge at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_edge(&mut self, index: usize) -> Result<Edge, TemplateError> {
        remove_at(&mut self.edges, EntryKind::Edge, index)
    }
}

impl CommandTemplate for OrderTemplate {
    const CATEGORY: Category = Category::Order;
    type Message = Order;

    fn render(&self, header: Header) -> Order {
        Order {
            header,
            order_id: self.order_id.clone(),
            order_update_id: self.order_update_id,
            zone_set_id: self.zone_set_id.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }
}

/// Draft of the next instant actions message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstantActionsTemplate {
    actions: Vec<Action>,
}

impl InstantActionsTemplate {
    /// Empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft seeded with an example action.
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            actions: vec![seed_action("action_001")],
        }
    }

    /// Actions in execution order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Append an action.
    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Update the action at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn update_action(
        &mut self,
        index: usize,
        update: ActionUpdate,
    ) -> Result<(), TemplateError> {
        update.apply(entry_mut(&mut self.actions, EntryKind::Action, index)?);
        Ok(())
    }

    /// Remove the action at `index`.
    ///
    /// # Errors
    ///
    /// Returns error if `index` is out of range.
    pub fn remove_action(&mut self, index: usize) -> Result<Action, TemplateError> {
        remove_at(&mut self.actions, EntryKind::Action, index)
    }
}

impl CommandTemplate for InstantActionsTemplate {
    const CATEGORY: Category = Category::InstantActions;
    type Message = InstantActions;

    fn render(&self, header: Header) -> InstantActions {
        InstantActions {
            header,
            actions: self.actions.clone(),
        }
    }
}

fn seed_action(action_id: &str) -> Action {
    Action {
        action_type: "PICK".to_string(),
        action_id: action_id.to_string(),
        action_description: Some("Picking up the load".to_string()),
        blocking_type: BlockingType::Hard,
        action_parameters: vec![
            ActionParameter::new("duration", 5),
            ActionParameter::new("direction", "left"),
        ],
    }
}

fn seed_node() -> Node {
    Node {
        node_id: "node_1".to_string(),
        sequence_id: 1,
        node_description: Some("First node".to_string()),
        released: true,
        node_position: Some(NodePosition {
            x: 0.0,
            y: 0.0,
            theta: Some(0.0),
            allowed_deviation_xy: Some(0.1),
            allowed_deviation_theta: Some(0.1),
            map_id: "map_1".to_string(),
            map_description: Some("Ground floor".to_string()),
        }),
        actions: vec![seed_action("action_1")],
    }
}

fn seed_edge() -> Edge {
    Edge {
        edge_description: Some("Edge to node 2".to_string()),
        max_speed: Some(1.5),
        max_height: Some(2.0),
        min_height: Some(0.5),
        orientation: Some(0.0),
        direction: Some("straight".to_string()),
        rotation_allowed: Some(true),
        max_rotation_speed: Some(0.5),
        length: Some(10.0),
        trajectory: Some(Trajectory {
            degree: 3,
            knot_vector: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            control_points: vec![
                ControlPoint {
                    x: 0.0,
                    y: 0.0,
                    weight: Some(1.0),
                },
                ControlPoint {
                    x: 5.0,
                    y: 0.0,
                    weight: Some(1.0),
                },
                ControlPoint {
                    x: 10.0,
                    y: 0.0,
                    weight: Some(1.0),
                },
            ],
        }),
        ..Edge::new("edge_1", 2, "node_1", "node_2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(header_id: u32) -> Header {
        Header {
            header_id,
            timestamp: chrono::Utc::now(),
            version: "2.0.0".to_string(),
            manufacturer: "acme".to_string(),
            serial_number: "001".to_string(),
        }
    }

    #[test]
    fn seeds_are_not_shared_between_templates() {
        let mut first = OrderTemplate::seeded();
        let second = OrderTemplate::seeded();

        first
            .update_node(
                0,
                NodeUpdate {
                    node_id: Some("changed".to_string()),
                    ..NodeUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(first.nodes()[0].node_id, "changed");
        assert_eq!(second.nodes()[0].node_id, "node_1");
    }

    #[test]
    fn update_in_range_touches_only_target() {
        let mut template = OrderTemplate::seeded();
        template.add_node(Node::new("node_2", 3));

        template
            .update_node(
                1,
                NodeUpdate {
                    sequence_id: Some(5),
                    released: Some(false),
                    ..NodeUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(template.nodes()[0], seed_node());
        assert_eq!(template.nodes()[1].node_id, "node_2");
        assert_eq!(template.nodes()[1].sequence_id, 5);
        assert!(!template.nodes()[1].released);
    }

    #[test]
    fn update_out_of_range_leaves_template_unchanged() {
        let mut template = OrderTemplate::seeded();
        let before = template.clone();

        let err = template
            .update_edge(
                1,
                EdgeUpdate {
                    max_speed: Some(9.0),
                    ..EdgeUpdate::default()
                },
            )
            .unwrap_err();

        assert_eq!(
            err,
            TemplateError::IndexOutOfRange {
                kind: EntryKind::Edge,
                index: 1,
                len: 1
            }
        );
        assert_eq!(template, before);
    }

    #[test]
    fn remove_out_of_range_leaves_template_unchanged() {
        let mut template = InstantActionsTemplate::seeded();
        let before = template.clone();

        assert!(template.remove_action(3).is_err());
        assert_eq!(template, before);
        assert_eq!(template.actions().len(), 1);
    }

    #[test]
    fn remove_in_range_shifts_following_entries() {
        let mut template = OrderTemplate::new("o1");
        template.add_edge(Edge::new("e1", 1, "a", "b"));
        template.add_edge(Edge::new("e2", 3, "b", "c"));

        let removed = template.remove_edge(0).unwrap();

        assert_eq!(removed.edge_id, "e1");
        assert_eq!(template.edges().len(), 1);
        assert_eq!(template.edges()[0].edge_id, "e2");
    }

    #[test]
    fn edge_update_keeps_unspecified_options() {
        let mut template = OrderTemplate::seeded();

        template
            .update_edge(
                0,
                EdgeUpdate {
                    max_speed: Some(0.8),
                    ..EdgeUpdate::default()
                },
            )
            .unwrap();

        let edge = &template.edges()[0];
        assert_eq!(edge.max_speed, Some(0.8));
        assert_eq!(edge.length, Some(10.0));
        assert!(edge.trajectory.is_some());
        assert_eq!(edge.direction.as_deref(), Some("straight"));
    }

    #[test]
    fn action_update_replaces_parameters() {
        let mut template = InstantActionsTemplate::seeded();

        template
            .update_action(
                0,
                ActionUpdate {
                    action_type: Some("DROP".to_string()),
                    action_parameters: Some(vec![ActionParameter::new("height", "low")]),
                    ..ActionUpdate::default()
                },
            )
            .unwrap();

        let action = &template.actions()[0];
        assert_eq!(action.action_type, "DROP");
        assert_eq!(action.action_id, "action_001");
        assert_eq!(action.action_parameters.len(), 1);
        assert_eq!(action.blocking_type, BlockingType::Hard);
    }

    #[test]
    fn render_snapshots_the_draft() {
        let mut template = OrderTemplate::seeded();
        template.set_order("order_002", 4);

        let order = template.render(header(9));
        template.add_node(Node::new("late", 9));

        assert_eq!(order.header.header_id, 9);
        assert_eq!(order.order_id, "order_002");
        assert_eq!(order.order_update_id, 4);
        assert_eq!(order.nodes.len(), 1);
        assert_eq!(order.zone_set_id.as_deref(), Some("zone_set_001"));
    }
}
