#![forbid(unsafe_code)]

use crate::primitives::bytes::{buf, buf::Cursor, var};
use crate::storage::codec::{check_version, decode_count, ColumnCodec, ColumnKind};
use crate::storage::column::{AttributeColumn, Column, ColumnSet};
use crate::storage::element::{validate_common, CommonAttributes, ElementKind, Rejection};
use crate::storage::store::ElementStore;
use crate::types::{ElementIndex, ElementKindTag, Identifier, Result, RoadGraphError};

/// OSM relations such as routes and turn restrictions.
#[derive(Debug)]
pub enum Relation {}

/// Kind of a relation member.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemberKind {
    /// A node.
    Node,
    /// A way.
    Way,
    /// Another relation.
    Relation,
}

impl MemberKind {
    fn code(self) -> u8 {
        match self {
            MemberKind::Node => 0,
            MemberKind::Way => 1,
            MemberKind::Relation => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MemberKind::Node),
            1 => Ok(MemberKind::Way),
            2 => Ok(MemberKind::Relation),
            _ => Err(RoadGraphError::Corruption("unknown member kind")),
        }
    }
}

/// One member of a relation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Member {
    /// Source identifier of the member.
    pub identifier: Identifier,
    /// What the identifier refers to.
    pub kind: MemberKind,
    /// Role string, possibly empty.
    pub role: String,
}

/// The members of one relation, in source order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Members(pub Vec<Member>);

impl ColumnCodec for Members {
    const KIND: ColumnKind = ColumnKind::Members;

    fn encode_all(values: &[Self], out: &mut Vec<u8>) {
        var::encode_u64(values.len() as u64, out);
        for members in values {
            var::encode_u64(members.0.len() as u64, out);
            for member in &members.0 {
                var::encode_i64(member.identifier.0, out);
                out.push(member.kind.code());
                buf::put_str(out, &member.role);
            }
        }
    }

    fn decode_all(src: &[u8], version: u16) -> Result<Vec<Self>> {
        check_version(version, Self::VERSION)?;
        let mut cur = Cursor::new(src);
        let count = decode_count(&mut cur)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = decode_count(&mut cur)?;
            let mut members = Vec::with_capacity(len);
            for _ in 0..len {
                let identifier = Identifier(cur.var_i64()?);
                let kind = MemberKind::from_code(cur.u8()?)?;
                let role = cur.str()?.to_owned();
                members.push(Member {
                    identifier,
                    kind,
                    role,
                });
            }
            values.push(Members(members));
        }
        if cur.remaining() != 0 {
            return Err(RoadGraphError::Corruption("trailing bytes after member column"));
        }
        Ok(values)
    }
}

/// A relation before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationSpec {
    /// Common attributes; the identifier is the OSM relation id.
    pub common: CommonAttributes,
    /// Value of the `type` tag.
    pub relation_type: Option<String>,
    /// Members in source order.
    pub members: Vec<Member>,
    /// Route name derived from `network`/`ref`.
    pub route_name: Option<String>,
}

/// A stored relation.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationRecord {
    /// Dense index.
    pub index: ElementIndex,
    /// Common attributes.
    pub common: CommonAttributes,
    /// Value of the `type` tag.
    pub relation_type: Option<String>,
    /// Members in source order.
    pub members: Vec<Member>,
    /// Route name.
    pub route_name: Option<String>,
}

/// Relation-specific columns.
pub struct RelationColumns {
    /// `type` tag, empty when absent.
    pub relation_type: AttributeColumn<String>,
    /// Member lists.
    pub members: AttributeColumn<Members>,
    /// Route name, empty when absent.
    pub route_name: AttributeColumn<String>,
}

impl ColumnSet for RelationColumns {
    fn columns(&self) -> Vec<&dyn Column> {
        vec![&self.relation_type, &self.members, &self.route_name]
    }
}

impl ElementKind for Relation {
    const TAG: ElementKindTag = ElementKindTag::Relation;
    type Spec = RelationSpec;
    type Record = RelationRecord;
    type Columns = RelationColumns;

    fn columns(owner: &str, estimate: usize) -> RelationColumns {
        RelationColumns {
            relation_type: AttributeColumn::new(owner, "relation_type", estimate),
            members: AttributeColumn::new(owner, "members", estimate),
            route_name: AttributeColumn::new(owner, "route_name", 0),
        }
    }

    fn common(spec: &RelationSpec) -> &CommonAttributes {
        &spec.common
    }

    fn validate(spec: &RelationSpec) -> std::result::Result<(), Rejection> {
        validate_common(&spec.common)?;
        if spec.members.is_empty() {
            return Err(Rejection("relation without members"));
        }
        if spec.members.iter().any(|member| !member.identifier.is_valid()) {
            return Err(Rejection("invalid member identifier"));
        }
        Ok(())
    }

    fn write(columns: &RelationColumns, index: ElementIndex, spec: &RelationSpec) -> Result<()> {
        if let Some(relation_type) = &spec.relation_type {
            columns.relation_type.set(index, relation_type.clone())?;
        }
        columns.members.set(index, Members(spec.members.clone()))?;
        if let Some(route_name) = &spec.route_name {
            columns.route_name.set(index, route_name.clone())?;
        }
        Ok(())
    }

    fn read(
        columns: &RelationColumns,
        index: ElementIndex,
        common: CommonAttributes,
    ) -> Result<RelationRecord> {
        let relation_type = columns.relation_type.get(index)?;
        let route_name = columns.route_name.get(index)?;
        Ok(RelationRecord {
            index,
            common,
            relation_type: (!relation_type.is_empty()).then_some(relation_type),
            members: columns.members.get(index)?.0,
            route_name: (!route_name.is_empty()).then_some(route_name),
        })
    }
}

impl ElementStore<Relation> {
    /// Reads the relation at `index`.
    pub fn relation(&self, index: ElementIndex) -> Result<RelationRecord> {
        self.record(index)
    }
}
