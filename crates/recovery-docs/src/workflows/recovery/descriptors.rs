//! Static document bundles per case type.

use serde::Serialize;

use super::domain::{CaseType, DescriptorCondition, DocumentGroup};

/// Declares one template a case type requires. Priority orders the signing queue only;
/// documents may be signed in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentDescriptor {
    pub template_name: &'static str,
    pub title: &'static str,
    pub priority: u16,
    pub notary_required: bool,
    pub group: DocumentGroup,
    pub condition: DescriptorCondition,
    pub fields: &'static [&'static str],
}

const CONTINGENT_FEE_AGREEMENT: DocumentDescriptor = DocumentDescriptor {
    template_name: "contingent_fee_agreement",
    title: "Contingent Fee Agreement",
    priority: 1,
    notary_required: false,
    group: DocumentGroup::Agreements,
    condition: DescriptorCondition::Always,
    fields: &[
        "client_name",
        "client_address",
        "client_phone",
        "client_email",
        "property_address",
        "county",
        "state",
        "case_number",
        "signing_date",
    ],
};

const LIMITED_POWER_OF_ATTORNEY: DocumentDescriptor = DocumentDescriptor {
    template_name: "limited_power_of_attorney",
    title: "Limited Power of Attorney",
    priority: 2,
    notary_required: true,
    group: DocumentGroup::Authorization,
    condition: DescriptorCondition::Always,
    fields: &[
        "client_name",
        "client_address",
        "property_address",
        "county",
        "state",
        "parcel_number",
        "role",
        "signing_date",
    ],
};

const CLAIMANT_AUTHORIZATION: DocumentDescriptor = DocumentDescriptor {
    template_name: "claimant_authorization",
    title: "Claimant Authorization and Release",
    priority: 3,
    notary_required: false,
    group: DocumentGroup::Authorization,
    condition: DescriptorCondition::Always,
    fields: &[
        "client_name",
        "client_email",
        "client_phone",
        "property_address",
        "foreclosure_type",
        "signing_date",
    ],
};

const SURPLUS_CLAIM_FORM: DocumentDescriptor = DocumentDescriptor {
    template_name: "surplus_funds_claim",
    title: "Surplus Funds Claim Form",
    priority: 4,
    notary_required: true,
    group: DocumentGroup::Notary,
    condition: DescriptorCondition::Always,
    fields: &[
        "claimant_name",
        "mailing_address",
        "property_address",
        "county",
        "state",
        "parcel_number",
        "foreclosure_type",
        "role",
        "case_number",
        "signing_date",
    ],
};

const W9_FORM: DocumentDescriptor = DocumentDescriptor {
    template_name: "w9_request",
    title: "W-9 Taxpayer Identification",
    priority: 9,
    notary_required: false,
    group: DocumentGroup::Administrative,
    condition: DescriptorCondition::Always,
    fields: &["client_name", "client_address", "signing_date"],
};

const HEIR_AUTHORIZATION: DocumentDescriptor = DocumentDescriptor {
    template_name: "heir_authorization",
    title: "Heir Authorization and Assignment",
    priority: 2,
    notary_required: false,
    group: DocumentGroup::Authorization,
    condition: DescriptorCondition::HeirOnly,
    fields: &[
        "heir_name",
        "deceased_name",
        "relationship",
        "property_address",
        "county",
        "state",
        "role",
        "signing_date",
    ],
};

const AFFIDAVIT_OF_HEIRSHIP: DocumentDescriptor = DocumentDescriptor {
    template_name: "affidavit_of_heirship",
    title: "Affidavit of Heirship",
    priority: 3,
    notary_required: true,
    group: DocumentGroup::Notary,
    condition: DescriptorCondition::HeirOnly,
    fields: &[
        "heir_name",
        "mailing_address",
        "deceased_name",
        "relationship",
        "date_of_death",
        "property_address",
        "county",
        "state",
        "signing_date",
    ],
};

const PRE_ESTATE_HEIR_AGREEMENT: DocumentDescriptor = DocumentDescriptor {
    template_name: "pre_estate_heir_agreement",
    title: "Pre-Estate Heir Agreement",
    priority: 2,
    notary_required: false,
    group: DocumentGroup::Agreements,
    condition: DescriptorCondition::PreEstateOnly,
    fields: &[
        "heir_name",
        "deceased_name",
        "relationship",
        "date_of_death",
        "property_address",
        "county",
        "state",
        "case_number",
        "signing_date",
    ],
};

const SMALL_ESTATE_AFFIDAVIT: DocumentDescriptor = DocumentDescriptor {
    template_name: "small_estate_affidavit",
    title: "Small Estate Affidavit",
    priority: 4,
    notary_required: true,
    group: DocumentGroup::Notary,
    condition: DescriptorCondition::PreEstateOnly,
    fields: &[
        "heir_name",
        "mailing_address",
        "deceased_name",
        "date_of_death",
        "relationship",
        "county",
        "state",
        "signing_date",
    ],
};

const ATTORNEY_ENGAGEMENT_LETTER: DocumentDescriptor = DocumentDescriptor {
    template_name: "attorney_engagement_letter",
    title: "Attorney Engagement Letter",
    priority: 2,
    notary_required: false,
    group: DocumentGroup::Agreements,
    condition: DescriptorCondition::AttorneyOnly,
    fields: &[
        "client_name",
        "client_address",
        "client_email",
        "property_address",
        "county",
        "state",
        "case_number",
        "signing_date",
    ],
};

const STANDARD_BUNDLE: &[DocumentDescriptor] = &[
    CONTINGENT_FEE_AGREEMENT,
    LIMITED_POWER_OF_ATTORNEY,
    CLAIMANT_AUTHORIZATION,
    SURPLUS_CLAIM_FORM,
    W9_FORM,
];

const HEIR_BUNDLE: &[DocumentDescriptor] = &[
    CONTINGENT_FEE_AGREEMENT,
    HEIR_AUTHORIZATION,
    AFFIDAVIT_OF_HEIRSHIP,
    W9_FORM,
];

const PRE_ESTATE_BUNDLE: &[DocumentDescriptor] = &[
    CONTINGENT_FEE_AGREEMENT,
    PRE_ESTATE_HEIR_AGREEMENT,
    AFFIDAVIT_OF_HEIRSHIP,
    SMALL_ESTATE_AFFIDAVIT,
    W9_FORM,
];

const ATTORNEY_BUNDLE: &[DocumentDescriptor] = &[
    CONTINGENT_FEE_AGREEMENT,
    ATTORNEY_ENGAGEMENT_LETTER,
    LIMITED_POWER_OF_ATTORNEY,
    SURPLUS_CLAIM_FORM,
    W9_FORM,
];

fn bundle(case_type: CaseType) -> &'static [DocumentDescriptor] {
    match case_type {
        CaseType::Standard => STANDARD_BUNDLE,
        CaseType::Heir => HEIR_BUNDLE,
        CaseType::AttorneyRequired => ATTORNEY_BUNDLE,
        CaseType::PreEstate => PRE_ESTATE_BUNDLE,
    }
}

/// Ordered descriptors for a case type, ascending by priority.
///
/// Every entry of a bundle is returned; `condition` is never re-applied as a filter.
pub fn resolve(case_type: CaseType) -> Vec<DocumentDescriptor> {
    let mut descriptors = bundle(case_type).to_vec();
    descriptors.sort_by_key(|descriptor| descriptor.priority);
    descriptors
}

/// Look up a known template across every bundle.
pub fn find_template(template_name: &str) -> Option<DocumentDescriptor> {
    CaseType::ALL
        .iter()
        .flat_map(|case_type| bundle(*case_type).iter())
        .find(|descriptor| descriptor.template_name == template_name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_case_type_resolves_a_sorted_non_empty_bundle() {
        for case_type in CaseType::ALL {
            let descriptors = resolve(case_type);
            assert!(!descriptors.is_empty(), "{} bundle empty", case_type.label());
            assert!(descriptors
                .windows(2)
                .all(|pair| pair[0].priority <= pair[1].priority));
        }
    }

    #[test]
    fn heir_bundle_carries_heirship_affidavit_and_fee_agreement() {
        let descriptors = resolve(CaseType::Heir);

        let affidavit = descriptors
            .iter()
            .find(|d| d.title == "Affidavit of Heirship")
            .expect("affidavit present");
        assert!(affidavit.notary_required);

        let fee = descriptors
            .iter()
            .find(|d| d.title == "Contingent Fee Agreement")
            .expect("fee agreement present");
        assert!(!fee.notary_required);
    }

    #[test]
    fn condition_tags_do_not_filter_bundle_entries() {
        let heir_only = resolve(CaseType::Heir)
            .into_iter()
            .filter(|d| d.condition == DescriptorCondition::HeirOnly)
            .count();
        assert_eq!(heir_only, 2);
    }

    #[test]
    fn template_names_are_unique_within_each_bundle() {
        for case_type in CaseType::ALL {
            let descriptors = resolve(case_type);
            for (index, descriptor) in descriptors.iter().enumerate() {
                assert!(descriptors[index + 1..]
                    .iter()
                    .all(|other| other.template_name != descriptor.template_name));
            }
        }
    }

    #[test]
    fn find_template_spans_bundles() {
        let found = find_template("small_estate_affidavit").expect("known template");
        assert_eq!(found.condition, DescriptorCondition::PreEstateOnly);
        assert!(find_template("unknown_template").is_none());
    }
}
