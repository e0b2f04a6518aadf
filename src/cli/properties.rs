use clap::{Args, Subcommand};
use novaava::domain::{
    SpecKey, SpecParameters,
    properties::{self, check_structure},
};

use super::terminal::Colorize;

#[derive(Debug, Subcommand)]
pub enum Properties {
    /// Build a blob from SPEC parameters
    Encode(Encode),

    /// Print the key/value pairs stored in a blob
    Decode {
        /// The serialized blob
        blob: String,
    },
}

#[derive(Debug, Args)]
pub struct Encode {
    /// Product name
    #[arg(long)]
    name: Option<String>,

    /// Nominal size
    #[arg(long)]
    size: Option<String>,

    /// Product type
    #[arg(long = "type")]
    kind: Option<String>,

    /// Filter / classification
    #[arg(long)]
    filter: Option<String>,

    /// Manufacturer
    #[arg(long)]
    manufacturer: Option<String>,

    /// Material
    #[arg(long)]
    material: Option<String>,
}

impl Encode {
    fn parameters(self) -> SpecParameters {
        let mut parameters = SpecParameters::default();
        for (key, value) in [
            (SpecKey::Name, self.name),
            (SpecKey::Size, self.size),
            (SpecKey::Type, self.kind),
            (SpecKey::Filter, self.filter),
            (SpecKey::Manufacturer, self.manufacturer),
            (SpecKey::Material, self.material),
        ] {
            if let Some(value) = value {
                parameters.set(key, value);
            }
        }
        parameters
    }
}

impl Properties {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Encode(encode) => println!("{}", properties::encode(&encode.parameters())),
            Self::Decode { blob } => {
                for violation in check_structure(&blob) {
                    eprintln!("{}", format!("! {violation}").warning());
                }
                let decoded = properties::decode(&blob);
                if decoded.is_empty() {
                    println!("{}", "No parameters".dim());
                }
                for (key, value) in decoded.iter() {
                    println!("{key}: {value}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(subcommand)]
        properties: Properties,
    }

    #[test]
    fn encode_flags_map_to_parameters() {
        let harness =
            Harness::try_parse_from(["ava", "encode", "--name", "Valve", "--type", "Ball"]).unwrap();
        let Properties::Encode(encode) = harness.properties else {
            panic!("expected encode");
        };
        let parameters = encode.parameters();
        assert_eq!(parameters.get(SpecKey::Name), "Valve");
        assert_eq!(parameters.get(SpecKey::Type), "Ball");
        assert!(parameters.get(SpecKey::Size).is_empty());
    }
}
