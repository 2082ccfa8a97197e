//! Domain types shared by every component: ids, fields, bind values,
//! actors and stored changeset values.

pub mod actor;
pub mod changeset;
pub mod field;
pub mod ids;
pub mod value;
