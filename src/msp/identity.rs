use crate::{
    crypto::cert::Certificate,
    error::Result,
    proto,
    util::ser,
};
use getset;

/// A signer: the MSP they claim membership in, and their certificate. This is
/// what travels next to a signature (as a serialized `SerializedIdentity`).
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct Identity {
    msp_id: String,
    certificate: Certificate,
}

impl Identity {
    pub fn new<T: Into<String>>(msp_id: T, certificate: Certificate) -> Self {
        Self {
            msp_id: msp_id.into(),
            certificate,
        }
    }

    /// Decode a serialized identity. The certificate may be PEM or DER.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let serialized: proto::SerializedIdentity = ser::deserialize(bytes)?;
        let certificate = Certificate::decode(&serialized.id_bytes)?;
        Ok(Self::new(serialized.mspid, certificate))
    }

    /// Serialize this identity, PEM-armoring the certificate.
    pub fn to_bytes(&self) -> Vec<u8> {
        let serialized = proto::SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.certificate.to_pem(),
        };
        ser::serialize(&serialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Error,
        util::test::TestCa,
    };

    #[test]
    fn identity_bytes() {
        let ca = TestCa::new("Org1 CA");
        let identity = Identity::new("Org1MSP", ca.issue_leaf("peer0").certificate());
        let identity2 = Identity::from_bytes(&identity.to_bytes()).unwrap();
        assert_eq!(identity, identity2);
        assert_eq!(identity2.msp_id(), "Org1MSP");

        // DER in id_bytes works too
        let der = proto::SerializedIdentity {
            mspid: "Org1MSP".into(),
            id_bytes: identity.certificate().raw().clone(),
        };
        assert_eq!(Identity::from_bytes(&ser::serialize(&der)).unwrap(), identity);

        let junk = proto::SerializedIdentity {
            mspid: "Org1MSP".into(),
            id_bytes: b"not a cert".to_vec(),
        };
        assert!(matches!(Identity::from_bytes(&ser::serialize(&junk)), Err(Error::MalformedCertificate(_))));
    }
}
