pub mod population;
pub mod sheet;
