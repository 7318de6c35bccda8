/// The way a body moves and interacts with others.
///
/// The discriminants double as the tag stored in the low bits of a [`ProxyKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Zero velocity, infinite mass, never moves on its own.
    Static = 0,
    /// Moves by user-set velocity, unaffected by collisions.
    Kinematic = 1,
    /// Fully simulated.
    Dynamic = 2,
}

impl BodyType {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(BodyType::Static),
            1 => Some(BodyType::Kinematic),
            2 => Some(BodyType::Dynamic),
            _ => None,
        }
    }
}

/// A spatial tree proxy id and the type of its body packed into one integer.
///
/// The type selects which of the broad phase's trees the proxy lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyKey(u32);

impl ProxyKey {
    const TYPE_BITS: u32 = 2;
    const TYPE_MASK: u32 = (1 << Self::TYPE_BITS) - 1;

    #[inline]
    pub fn new(proxy_id: u32, body_type: BodyType) -> Self {
        debug_assert!(
            proxy_id < (1 << (32 - Self::TYPE_BITS)),
            "proxy id {proxy_id} does not fit in a proxy key"
        );
        ProxyKey((proxy_id << Self::TYPE_BITS) | body_type as u32)
    }

    #[inline]
    pub fn proxy_id(&self) -> u32 {
        self.0 >> Self::TYPE_BITS
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        match BodyType::from_tag(self.0 & Self::TYPE_MASK) {
            Some(ty) => ty,
            None => unreachable!("proxy key {:#x} carries an invalid body type tag", self.0),
        }
    }

    /// Key used in the move set. Offset by one because zero marks an empty slot.
    #[inline]
    pub(crate) fn move_set_key(&self) -> u64 {
        self.0 as u64 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let types = [BodyType::Static, BodyType::Kinematic, BodyType::Dynamic];
        for id in [0, 1, 2, 77, 4096, (1 << 30) - 1] {
            for ty in types {
                let key = ProxyKey::new(id, ty);
                assert_eq!(key.proxy_id(), id);
                assert_eq!(key.body_type(), ty);
            }
        }
    }

    #[test]
    fn move_set_key_is_never_zero() {
        assert_eq!(ProxyKey::new(0, BodyType::Static).move_set_key(), 1);
    }
}
