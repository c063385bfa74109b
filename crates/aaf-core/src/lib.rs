pub mod clock;
pub mod dictionary;
pub mod errors;
pub mod ids;
pub mod object;
pub mod random;
pub mod value;

pub use clock::{Clock, SystemClock};
pub use dictionary::{ClassSchema, Dictionary, PropertyDescriptor};
pub use errors::{AafError, Result};
pub use ids::{Auid, MobID};
pub use object::{Arena, Object, PropertyBag};
pub use random::{OsRandomSource, RandomSource};
pub use value::{InstanceId, PropertyValue, StorageKind};
