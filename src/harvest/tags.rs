//! Well-known RPM header tag identifiers and type codes.

// Header data types.
pub const TYPE_NULL: u32 = 0;
pub const TYPE_CHAR: u32 = 1;
pub const TYPE_INT8: u32 = 2;
pub const TYPE_INT16: u32 = 3;
pub const TYPE_INT32: u32 = 4;
pub const TYPE_INT64: u32 = 5;
pub const TYPE_STRING: u32 = 6;
pub const TYPE_BIN: u32 = 7;
pub const TYPE_STRING_ARRAY: u32 = 8;
pub const TYPE_I18NSTRING: u32 = 9;

// Region markers.
pub const HEADER_SIGNATURES: u32 = 62;
pub const HEADER_IMMUTABLE: u32 = 63;
pub const HEADER_I18NTABLE: u32 = 100;

// Header digests.
pub const SIGMD5: u32 = 261;
pub const SHA1HEADER: u32 = 269;
pub const SHA256HEADER: u32 = 273;

// Package identity and description.
pub const NAME: u32 = 1000;
pub const VERSION: u32 = 1001;
pub const RELEASE: u32 = 1002;
pub const EPOCH: u32 = 1003;
pub const SUMMARY: u32 = 1004;
pub const DESCRIPTION: u32 = 1005;
pub const BUILDTIME: u32 = 1006;
pub const BUILDHOST: u32 = 1007;
pub const INSTALLTIME: u32 = 1008;
pub const SIZE: u32 = 1009;
pub const VENDOR: u32 = 1011;
pub const LICENSE: u32 = 1014;
pub const PACKAGER: u32 = 1015;
pub const GROUP: u32 = 1016;
pub const URL: u32 = 1020;
pub const OS: u32 = 1021;
pub const ARCH: u32 = 1022;

// File list.
pub const FILESIZES: u32 = 1028;
pub const FILEMODES: u32 = 1030;
pub const FILEDIGESTS: u32 = 1035;
pub const FILEFLAGS: u32 = 1037;
pub const FILEUSERNAME: u32 = 1039;
pub const FILEGROUPNAME: u32 = 1040;
pub const SOURCERPM: u32 = 1044;
pub const PROVIDENAME: u32 = 1047;
pub const REQUIRENAME: u32 = 1049;
pub const DIRINDEXES: u32 = 1116;
pub const BASENAMES: u32 = 1117;
pub const DIRNAMES: u32 = 1118;
pub const LONGFILESIZES: u32 = 5008;
pub const LONGSIZE: u32 = 5009;
pub const FILEDIGESTALGO: u32 = 5011;
pub const PAYLOADDIGEST: u32 = 5092;
pub const MODULARITYLABEL: u32 = 5096;

// Signature header tags (own index space).
pub const SIG_SIZE: u32 = 1000;
pub const SIG_MD5: u32 = 1004;
pub const SIG_PAYLOADSIZE: u32 = 1007;

/// Tags the normalizer maps onto named record fields. Everything else is
/// carried through opaquely.
pub const NORMALIZED: &[u32] = &[
    HEADER_IMMUTABLE,
    HEADER_I18NTABLE,
    SIGMD5,
    SHA1HEADER,
    SHA256HEADER,
    NAME,
    VERSION,
    RELEASE,
    EPOCH,
    SUMMARY,
    BUILDTIME,
    INSTALLTIME,
    SIZE,
    VENDOR,
    LICENSE,
    URL,
    ARCH,
    FILESIZES,
    FILEDIGESTS,
    SOURCERPM,
    DIRINDEXES,
    BASENAMES,
    DIRNAMES,
    LONGFILESIZES,
    LONGSIZE,
    FILEDIGESTALGO,
    PAYLOADDIGEST,
    MODULARITYLABEL,
];

/// Maps a `FILEDIGESTALGO` value (OpenPGP hash id) to its name.
pub fn digest_algorithm_name(id: u64) -> Option<&'static str> {
    match id {
        1 => Some("md5"),
        2 => Some("sha1"),
        3 => Some("ripemd160"),
        8 => Some("sha256"),
        9 => Some("sha384"),
        10 => Some("sha512"),
        11 => Some("sha224"),
        _ => None,
    }
}
