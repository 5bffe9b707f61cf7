//! Mutation traces handed over by the mutation-execution engine on commit.
//!
//! A trace is a forest of write records. Nested writes (`create`, `connect`,
//! `connectOrCreate`, `delete`, `disconnect` inside another write) appear as
//! children of the record that caused them, to any depth.

use serde::{Deserialize, Serialize};

use crate::types::JsonObject;

/// Kind of committed write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WriteOp {
    NodeCreate,
    NodeUpdate,
    NodeDelete,
    RelConnect,
    RelDisconnect,
}

impl WriteOp {
    /// Removals are reported after everything nested beneath them.
    pub fn emits_after_children(self) -> bool {
        matches!(self, Self::NodeDelete | Self::RelDisconnect)
    }

    pub fn is_relationship(self) -> bool {
        matches!(self, Self::RelConnect | Self::RelDisconnect)
    }
}

/// One committed write.
///
/// For relationship writes the owner node (the node the nested write was
/// issued from) is `concrete_type` with its snapshot in `after` (or `before`),
/// and `relationship_field` is the field on the owner that was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub op: WriteOp,
    pub concrete_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_end_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_end: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceRecord>,
}

impl TraceRecord {
    fn bare(op: WriteOp, concrete_type: &str) -> Self {
        Self {
            op,
            concrete_type: concrete_type.to_string(),
            before: None,
            after: None,
            relationship_field: None,
            relationship_kind: None,
            other_end_type: None,
            other_end: None,
            edge: None,
            children: Vec::new(),
        }
    }

    pub fn create(concrete_type: &str, after: serde_json::Value) -> Self {
        Self {
            after: Some(object(after)),
            ..Self::bare(WriteOp::NodeCreate, concrete_type)
        }
    }

    pub fn update(
        concrete_type: &str,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self {
            before: Some(object(before)),
            after: Some(object(after)),
            ..Self::bare(WriteOp::NodeUpdate, concrete_type)
        }
    }

    pub fn delete(concrete_type: &str, before: serde_json::Value) -> Self {
        Self {
            before: Some(object(before)),
            ..Self::bare(WriteOp::NodeDelete, concrete_type)
        }
    }

    /// A relationship created from `owner_type` through `field`.
    pub fn connect(
        owner_type: &str,
        owner: serde_json::Value,
        field: &str,
        other_type: &str,
        other: serde_json::Value,
    ) -> Self {
        Self {
            after: Some(object(owner)),
            relationship_field: Some(field.to_string()),
            other_end_type: Some(other_type.to_string()),
            other_end: Some(object(other)),
            ..Self::bare(WriteOp::RelConnect, owner_type)
        }
    }

    /// A relationship removed from `owner_type` through `field`.
    pub fn disconnect(
        owner_type: &str,
        owner: serde_json::Value,
        field: &str,
        other_type: &str,
        other: serde_json::Value,
    ) -> Self {
        Self {
            before: Some(object(owner)),
            relationship_field: Some(field.to_string()),
            other_end_type: Some(other_type.to_string()),
            other_end: Some(object(other)),
            ..Self::bare(WriteOp::RelDisconnect, owner_type)
        }
    }

    pub fn with_edge(mut self, edge: serde_json::Value) -> Self {
        self.edge = Some(object(edge));
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.relationship_kind = Some(kind.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<TraceRecord>) -> Self {
        self.children = children;
        self
    }

    /// Owner snapshot of a relationship write, or the node snapshot of a node write.
    pub fn owner_snapshot(&self) -> Option<&JsonObject> {
        match self.op {
            WriteOp::NodeDelete | WriteOp::RelDisconnect => {
                self.before.as_ref().or(self.after.as_ref())
            }
            _ => self.after.as_ref().or(self.before.as_ref()),
        }
    }
}

fn object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// Everything one mutation committed, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MutationTrace {
    pub records: Vec<TraceRecord>,
}

impl MutationTrace {
    pub fn new(records: Vec<TraceRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flatten the record forest into emission order.
    ///
    /// Creates, updates and connects come before their nested writes;
    /// deletes and disconnects come after them. Siblings keep trace order.
    pub fn emission_order(&self) -> Vec<&TraceRecord> {
        let mut out = Vec::new();
        let mut stack: Vec<(&TraceRecord, bool)> =
            self.records.iter().rev().map(|r| (r, false)).collect();

        while let Some((record, expanded)) = stack.pop() {
            if expanded {
                out.push(record);
                continue;
            }
            if record.op.emits_after_children() {
                stack.push((record, true));
            } else {
                out.push(record);
            }
            stack.extend(record.children.iter().rev().map(|c| (c, false)));
        }

        out
    }
}
