pub const ISSUE: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      number
      title
      issueType { name }
    }
  }
}"#;

pub const ISSUE_PARENT: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      parent {
        number
        title
        issueType { name }
      }
    }
  }
}"#;

pub const SUB_ISSUES: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      subIssues(first: $first, after: $after) {
        nodes {
          number
          title
          issueType { name }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

pub const ISSUE_PROJECT_ITEMS: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String, $fieldName: String!) {
  repository(owner: $owner, name: $repo) {
    issue(number: $number) {
      projectItems(first: $first, after: $after) {
        nodes {
          id
          project { id }
          fieldValueByName(name: $fieldName) {
            ... on ProjectV2ItemFieldSingleSelectValue { name }
          }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

pub const STATUS_FIELD: &str = r#"
query($projectId: ID!, $fieldName: String!) {
  node(id: $projectId) {
    ... on ProjectV2 {
      field(name: $fieldName) {
        ... on ProjectV2SingleSelectField {
          id
          name
          options { id name }
        }
      }
    }
  }
}"#;

pub const PROJECT_ITEMS: &str = r#"
query($projectId: ID!, $first: Int!, $after: String, $fieldName: String!) {
  node(id: $projectId) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        nodes {
          id
          content {
            ... on Issue {
              number
              title
              issueType { name }
              repository { nameWithOwner }
            }
          }
          fieldValueByName(name: $fieldName) {
            ... on ProjectV2ItemFieldSingleSelectValue { name }
          }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

pub const ORGANIZATION_PROJECT: &str = r#"
query($login: String!, $number: Int!) {
  organization(login: $login) {
    projectV2(number: $number) { id }
  }
}"#;

pub const USER_PROJECT: &str = r#"
query($login: String!, $number: Int!) {
  user(login: $login) {
    projectV2(number: $number) { id }
  }
}"#;

pub const SET_SINGLE_SELECT: &str = r#"
mutation($projectId: ID!, $itemId: ID!, $fieldId: ID!, $optionId: String!) {
  updateProjectV2ItemFieldValue(input: {
    projectId: $projectId
    itemId: $itemId
    fieldId: $fieldId
    value: { singleSelectOptionId: $optionId }
  }) {
    projectV2Item { id }
  }
}"#;
