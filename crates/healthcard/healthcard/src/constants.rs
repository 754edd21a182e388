/// DF.ESIGN, holds the authentication certificate and key
pub const ESIGN_AID: &[u8] = b"\xA0\x00\x00\x01\x67\x45\x53\x49\x47\x4E";

pub mod files {
    /// EF.Version2 below the MF, read by short file identifier
    pub const EF_VERSION2_SFI: u8 = 0x11;
    /// EF.CardAccess below the MF, carries the PACE parameters
    pub const EF_CARD_ACCESS_FID: u16 = 0x011C;
    /// EF.C.CH.AUT.E256 in DF.ESIGN, the holder's authentication certificate
    pub const EF_C_CH_AUT_E256_FID: u16 = 0xC504;
}

pub mod tags {
    /// Encrypted nonce from the card
    pub const ENCRYPTED_NONCE: u32 = 0x80;
    /// Host's ephemeral mapping key
    pub const MAPPING_DATA_HOST: u32 = 0x81;
    /// Card's ephemeral mapping key
    pub const MAPPING_DATA_CARD: u32 = 0x82;
    /// Host's ephemeral key on the mapped generator
    pub const EPHEMERAL_KEY_HOST: u32 = 0x83;
    /// Card's ephemeral key on the mapped generator
    pub const EPHEMERAL_KEY_CARD: u32 = 0x84;
    /// Host's authentication token
    pub const AUTH_TOKEN_HOST: u32 = 0x85;
    /// Card's authentication token
    pub const AUTH_TOKEN_CARD: u32 = 0x86;

    /// Public key data object hashed into the authentication tokens
    pub const PUBLIC_KEY: u32 = 0x7F49;
    /// Object identifier inside [`PUBLIC_KEY`]
    pub const OBJECT_IDENTIFIER: u32 = 0x06;
    /// Elliptic curve point inside [`PUBLIC_KEY`]
    pub const EC_POINT: u32 = 0x86;
}
