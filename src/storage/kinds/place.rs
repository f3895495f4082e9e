#![forbid(unsafe_code)]

use crate::storage::codec::{coded_column, Coded};
use crate::storage::column::{AttributeColumn, Column, ColumnSet};
use crate::storage::element::{validate_common, CommonAttributes, ElementKind, Rejection};
use crate::storage::store::ElementStore;
use crate::types::{ElementIndex, ElementKindTag, Location, Result};

/// Named settlements.
#[derive(Debug)]
pub enum Place {}

/// Settlement class from the `place` tag.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PlaceType {
    /// Null marker.
    #[default]
    Unknown,
    /// `place=city`.
    City,
    /// `place=town`.
    Town,
    /// `place=village`.
    Village,
    /// `place=hamlet`.
    Hamlet,
    /// `place=suburb`.
    Suburb,
    /// `place=neighbourhood` and `quarter`.
    Neighbourhood,
    /// `place=locality`.
    Locality,
    /// `place=isolated_dwelling`.
    IsolatedDwelling,
}

impl Coded for PlaceType {
    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PlaceType::Unknown,
            1 => PlaceType::City,
            2 => PlaceType::Town,
            3 => PlaceType::Village,
            4 => PlaceType::Hamlet,
            5 => PlaceType::Suburb,
            6 => PlaceType::Neighbourhood,
            7 => PlaceType::Locality,
            8 => PlaceType::IsolatedDwelling,
            _ => return None,
        })
    }
}

coded_column!(PlaceType);

/// A place before it is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceSpec {
    /// Common attributes.
    pub common: CommonAttributes,
    /// Representative point.
    pub location: Location,
    /// Settlement class.
    pub place_type: PlaceType,
    /// Inhabitants.
    pub population: Option<u32>,
    /// Name.
    pub name: Option<String>,
}

/// A stored place.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceRecord {
    /// Dense index.
    pub index: ElementIndex,
    /// Common attributes.
    pub common: CommonAttributes,
    /// Representative point.
    pub location: Location,
    /// Settlement class.
    pub place_type: PlaceType,
    /// Inhabitants.
    pub population: Option<u32>,
    /// Name.
    pub name: Option<String>,
}

/// Place-specific columns.
pub struct PlaceColumns {
    /// Representative point.
    pub location: AttributeColumn<Location>,
    /// Settlement class.
    pub place_type: AttributeColumn<PlaceType>,
    /// Inhabitants, 0 when unknown.
    pub population: AttributeColumn<u32>,
    /// Name.
    pub name: AttributeColumn<String>,
}

impl ColumnSet for PlaceColumns {
    fn columns(&self) -> Vec<&dyn Column> {
        vec![&self.location, &self.place_type, &self.population, &self.name]
    }
}

impl ElementKind for Place {
    const TAG: ElementKindTag = ElementKindTag::Place;
    type Spec = PlaceSpec;
    type Record = PlaceRecord;
    type Columns = PlaceColumns;

    fn columns(owner: &str, estimate: usize) -> PlaceColumns {
        PlaceColumns {
            location: AttributeColumn::new(owner, "location", estimate),
            place_type: AttributeColumn::new(owner, "place_type", estimate),
            population: AttributeColumn::new(owner, "population", 0),
            name: AttributeColumn::new(owner, "name", estimate),
        }
    }

    fn common(spec: &PlaceSpec) -> &CommonAttributes {
        &spec.common
    }

    fn validate(spec: &PlaceSpec) -> std::result::Result<(), Rejection> {
        validate_common(&spec.common)?;
        if !spec.location.is_valid() {
            return Err(Rejection("place location out of range"));
        }
        if spec.place_type == PlaceType::Unknown {
            return Err(Rejection("unknown place type"));
        }
        if spec.name.as_deref().map_or(true, str::is_empty) {
            return Err(Rejection("place without name"));
        }
        Ok(())
    }

    fn write(columns: &PlaceColumns, index: ElementIndex, spec: &PlaceSpec) -> Result<()> {
        columns.location.set(index, spec.location)?;
        columns.place_type.set(index, spec.place_type)?;
        if let Some(population) = spec.population {
            columns.population.set(index, population)?;
        }
        if let Some(name) = &spec.name {
            columns.name.set(index, name.clone())?;
        }
        Ok(())
    }

    fn read(columns: &PlaceColumns, index: ElementIndex, common: CommonAttributes) -> Result<PlaceRecord> {
        let population = columns.population.get(index)?;
        let name = columns.name.get(index)?;
        Ok(PlaceRecord {
            index,
            common,
            location: columns.location.get(index)?,
            place_type: columns.place_type.get(index)?,
            population: (population != 0).then_some(population),
            name: (!name.is_empty()).then_some(name),
        })
    }
}

impl ElementStore<Place> {
    /// Reads the place at `index`.
    pub fn place(&self, index: ElementIndex) -> Result<PlaceRecord> {
        self.record(index)
    }
}
