//! Well-known entity ids shared by every space.

pub const NAME: &str = "a126ca530c8e48d5b88882c734c38935";
pub const DESCRIPTION: &str = "9b1f76ff9711404c861e59dc3fa7d037";
pub const TYPES: &str = "8f151ba4de204e3c9cb499ddf96f48f1";
pub const SPACE: &str = "362c1dbddc6444bba3c4652f38a642d7";
pub const ATTRIBUTES: &str = "01412f8381894ab1836565c7fd358cc1";
pub const ATTRIBUTE: &str = "808a04ceb21c4d888ad12e240613e5ca";
pub const SCHEMA_TYPE: &str = "d7ab40920ab5441e88c35c27952de773";
pub const VALUE_TYPE: &str = "ee26ef23f7f14eb6b7423b0fa38c1fd8";

// Value type entities
pub const TEXT: &str = "9edb6fcce4544aa5861139d7f024c010";
pub const RELATION: &str = "14611456b4664cab920d2245f59ce828";
pub const DATE: &str = "167664f668f840e1976b20bd16ed8d47";
pub const WEB_URL: &str = "dfc221d98cce4f0b9353e437a98387e3";
pub const IMAGE: &str = "ba4e41460010499da0a3caaa7f579d0e";
pub const CHECKBOX: &str = "G9NpD4c7GB7nH5YU9Tesgf";
pub const NUMBER: &str = "LBdMpTNyycNffsF51t2eSp";

pub const AVATAR_ATTRIBUTE: &str = "235ba0e8dc7e4bdda1e16d0d4497f133";
pub const COVER_ATTRIBUTE: &str = "34f535072e6b42c5a84443981a77cfa2";

// Collections
pub const COLLECTION_TYPE: &str = "c373a33052df47b3a6d2df552bda4b44";
pub const COLLECTION_ITEM_TYPE: &str = "c167ef23fb2a40449ed945123ce7d2a9";
pub const COLLECTION_ITEM_COLLECTION_ID_REFERENCE_ATTRIBUTE: &str =
    "c43b537bcff742718822717fdf2c9c01";
pub const COLLECTION_ITEM_ENTITY_REFERENCE: &str = "c1f4cb6fece44c3ca447ab005b756972";
pub const COLLECTION_ITEM_INDEX: &str = "ede47e6930b044998ea4aafbda449609";

// Relations
pub const RELATION_TYPE: &str = "QtC4Ay8HNLwSd1kSARgcDE";
pub const RELATION_FROM_ATTRIBUTE: &str = "RERshk4JoYoMC17r1qAo9J";
pub const RELATION_TO_ATTRIBUTE: &str = "Qx8dASiTNsxxP3rJbd4Lzd";
pub const RELATION_TYPE_ATTRIBUTE: &str = "3WxYoAVreE4qFhkDUs5J3q";
pub const RELATION_INDEX: &str = "WNopXUYxsSsE51gkJGWghe";

pub const SPACE_FILTER: &str = "JiFmyuFYeoiRSiY286m7A2";
pub const IMAGE_TYPE: &str = "Q1LaZhnzj8AtCzx8T1HRMf";
pub const IMAGE_URL_ATTRIBUTE: &str = "J6cw1v8xUHCFsEdPeuB1Uo";
