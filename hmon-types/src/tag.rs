//! String-backed keys for monitors and registered deadlines.

use alloc::string::String;
use alloc::sync::Arc;
use core::borrow::Borrow;
use core::fmt;

macro_rules! string_tag {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(tag: impl AsRef<str>) -> Self {
                Self(Arc::from(tag.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(tag: &str) -> Self {
                Self::new(tag)
            }
        }

        impl From<String> for $name {
            fn from(tag: String) -> Self {
                Self(Arc::from(tag))
            }
        }

        impl From<&String> for $name {
            fn from(tag: &String) -> Self {
                Self::new(tag)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let tag = <String as serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self::from(tag))
            }
        }
    };
}

string_tag!(
    /// Name under which a monitor is registered with a health monitor.
    ///
    /// Cloning shares the underlying text.
    MonitorTag
);

string_tag!(
    /// Name of a deadline range registered on a deadline monitor builder.
    DeadlineTag
);

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::format;
    use alloc::string::ToString;

    #[test]
    fn compares_by_text() {
        assert_eq!(MonitorTag::from("camera"), MonitorTag::new(String::from("camera")));
        assert_ne!(MonitorTag::from("camera"), MonitorTag::from("Camera"));
    }

    #[test]
    fn clone_shares_storage() {
        let tag = DeadlineTag::from("frame");
        let copy = tag.clone();
        assert!(Arc::ptr_eq(&tag.0, &copy.0));
    }

    #[test]
    fn debug_and_display() {
        let tag = MonitorTag::from("lidar");
        assert_eq!(format!("{:?}", tag), "MonitorTag(lidar)");
        assert_eq!(tag.to_string(), "lidar");
        assert_eq!(format!("{:?}", DeadlineTag::from("x")), "DeadlineTag(x)");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(MonitorTag::from("radar"), 1);
        assert_eq!(map.get("radar"), Some(&1));
        assert_eq!(map.get("sonar"), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&MonitorTag::from("imu")).unwrap();
        assert_eq!(json, "\"imu\"");
        let back: MonitorTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "imu");
    }
}
